//! Room list state derived from sync.

use weft_store::RoomSummaryRecord;
use weft_types::{JoinedRoom, Membership, RoomId, event_types};

#[derive(Clone, Debug, PartialEq)]
pub struct RoomSummary {
    record: RoomSummaryRecord,
}

impl RoomSummary {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            record: RoomSummaryRecord::new(room_id),
        }
    }

    pub fn from_record(record: RoomSummaryRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &RoomSummaryRecord {
        &self.record
    }

    pub fn room_id(&self) -> &RoomId {
        &self.record.room_id
    }

    pub fn name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }

    /// The room name, or the room id for unnamed rooms.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(self.record.room_id.as_str())
    }

    pub fn membership(&self) -> Membership {
        self.record.membership
    }

    pub fn last_event_ts(&self) -> u64 {
        self.record.last_event_ts
    }

    pub fn last_message(&self) -> Option<&str> {
        self.record.last_message.as_deref()
    }

    pub fn joined_count(&self) -> u32 {
        self.record.joined_count
    }

    /// Fold one sync batch in. Returns true if anything changed.
    pub fn apply_sync(&mut self, room: &JoinedRoom, membership: Membership) -> bool {
        let before = self.record.clone();
        let record = &mut self.record;
        record.membership = membership;

        for event in room.all_events() {
            if event.is_type(event_types::NAME) {
                record.name = event.room_name().filter(|name| !name.is_empty()).map(str::to_string);
            }
        }
        for event in &room.timeline.events {
            record.last_event_ts = record.last_event_ts.max(event.origin_server_ts);
            if event.is_type(event_types::MESSAGE)
                && let Some(body) = event.body()
            {
                record.last_message = Some(body.to_string());
            }
        }
        if let Some(count) = room.summary.joined_member_count {
            record.joined_count = count;
        }
        *record != before
    }
}
