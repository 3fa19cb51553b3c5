//! Wire shapes for sync batches and history requests.
//!
//! Only the fields the timeline consumes are modeled; everything else in a
//! server response is ignored on decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::RoomEvent;
use crate::ids::RoomId;
use crate::key::Direction;

/// An incremental sync batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: BTreeMap<RoomId, JoinedRoom>,
}

/// Per-room section of a sync batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: TimelineChunk,
    #[serde(default)]
    pub state: StateChunk,
    #[serde(default)]
    pub summary: RoomSummaryChunk,
}

impl JoinedRoom {
    /// State events first, then timeline events, in delivery order.
    pub fn all_events(&self) -> impl Iterator<Item = &RoomEvent> {
        self.state.events.iter().chain(self.timeline.events.iter())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineChunk {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
    /// True when the server skipped events between the previous batch and this one.
    #[serde(default)]
    pub limited: bool,
    /// Pagination token for history before `events`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChunk {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
}

/// Server-computed room counts. Absent fields mean "unchanged".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummaryChunk {
    #[serde(rename = "m.joined_member_count", default, skip_serializing_if = "Option::is_none")]
    pub joined_member_count: Option<u32>,
    #[serde(rename = "m.invited_member_count", default, skip_serializing_if = "Option::is_none")]
    pub invited_member_count: Option<u32>,
}

/// Parameters of a history ("messages") request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagesRequest {
    pub from: String,
    pub dir: Direction,
    pub limit: usize,
}

/// Result of a history request.
///
/// `chunk` is ordered in the requested direction (newest first for
/// backward requests). `end` is absent once history is exhausted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub chunk: Vec<RoomEvent>,
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}
