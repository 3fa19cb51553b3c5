//! Reading entries back out of storage.

use std::rc::Rc;

use tracing::trace;
use weft_store::{Storage, TimelineEventRecord};
use weft_types::{Direction, Entry, EventKey, FragmentIdComparer, RoomId};

use crate::error::{TimelineError, TimelineResult};

/// Reads runs of entries for one room, crossing fragment seams.
pub struct TimelineReader {
    room_id: RoomId,
    storage: Storage,
    comparer: Rc<FragmentIdComparer>,
}

impl TimelineReader {
    pub fn new(room_id: RoomId, storage: Storage, comparer: Rc<FragmentIdComparer>) -> Self {
        Self {
            room_id,
            storage,
            comparer,
        }
    }

    /// Up to `amount` events strictly past `key` in `direction`, plus the
    /// boundary entries crossed on the way. Returned in ascending order.
    ///
    /// The walk leaves a fragment through its boundary. A boundary with a
    /// token is a gap and ends the read; a linked boundary is crossed into
    /// the neighbour fragment, whose facing boundary is emitted too.
    pub async fn read_from(&self, key: EventKey, direction: Direction, amount: usize) -> TimelineResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut events_read = 0;
        let mut cursor = Some(key);

        while let Some(key) = cursor.take() {
            if events_read >= amount {
                break;
            }
            let remaining = amount - events_read;
            let records = match direction {
                Direction::Forward => self.storage.events.events_after(&self.room_id, &key, remaining).await?,
                Direction::Backward => {
                    let mut records = self.storage.events.events_before(&self.room_id, &key, remaining).await?;
                    records.reverse();
                    records
                }
            };
            events_read += records.len();
            entries.extend(records.into_iter().map(record_entry));
            if events_read >= amount {
                break;
            }

            let fragment = self
                .storage
                .fragments
                .get(&self.room_id, key.fragment_id)
                .await?
                .ok_or_else(|| TimelineError::missing_fragment(&self.room_id, key.fragment_id))?;
            self.comparer.add(&fragment);
            let boundary = Entry::boundary(&fragment, direction);
            entries.push(boundary);

            if fragment.token(direction).is_none()
                && let Some(linked_id) = fragment.linked_fragment(direction)
            {
                let linked = self
                    .storage
                    .fragments
                    .get(&self.room_id, linked_id)
                    .await?
                    .ok_or_else(|| TimelineError::missing_fragment(&self.room_id, linked_id))?;
                self.comparer.add(&linked);
                let facing = Entry::boundary(&linked, direction.reverse());
                cursor = Some(facing.sort_key);
                entries.push(facing);
            }
        }

        if direction == Direction::Backward {
            entries.reverse();
        }
        trace!(room_id = %self.room_id, %key, ?direction, amount, read = entries.len(), "read entries");
        Ok(entries)
    }

    /// The newest `amount` events, anchored at the live fragment's end.
    /// Empty for a room that has never synced.
    pub async fn read_from_end(&self, amount: usize) -> TimelineResult<Vec<Entry>> {
        let Some(live) = self.storage.fragments.live_fragment(&self.room_id).await? else {
            return Ok(Vec::new());
        };
        self.comparer.add(&live);
        let end = Entry::fragment_end(&live);
        let mut entries = self.read_from(end.sort_key, Direction::Backward, amount).await?;
        entries.push(end);
        Ok(entries)
    }
}

fn record_entry(record: TimelineEventRecord) -> Entry {
    Entry::event(record.key, record.event)
}
