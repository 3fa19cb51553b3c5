//! Persisted room summaries, keyed by room id.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use weft_types::{Direction, Membership, RoomId};

use crate::error::StorageResult;
use crate::ops::OrderedStore;
use crate::query::QueryTarget;
use crate::range::KeyRange;

/// What the room list needs to know about a room without opening its timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomSummaryRecord {
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub membership: Membership,
    #[serde(default)]
    pub last_event_ts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default)]
    pub joined_count: u32,
}

impl RoomSummaryRecord {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            name: None,
            membership: Membership::default(),
            last_event_ts: 0,
            last_message: None,
            joined_count: 0,
        }
    }
}

#[derive(Clone)]
pub struct RoomSummaryStore {
    summaries: QueryTarget<String, RoomSummaryRecord>,
}

impl RoomSummaryStore {
    pub fn new(store: Rc<dyn OrderedStore<String, RoomSummaryRecord>>) -> Self {
        Self {
            summaries: QueryTarget::new(store),
        }
    }

    pub async fn get(&self, room_id: &RoomId) -> StorageResult<Option<RoomSummaryRecord>> {
        self.summaries.get(&room_id.as_str().to_string()).await
    }

    pub async fn set(&self, summary: RoomSummaryRecord) -> StorageResult<()> {
        self.summaries.put(summary.room_id.as_str().to_string(), summary).await
    }

    /// Every stored summary, ordered by room id.
    pub async fn all(&self) -> StorageResult<Vec<RoomSummaryRecord>> {
        self.summaries.select_all(KeyRange::all(), Direction::Forward).await
    }
}
