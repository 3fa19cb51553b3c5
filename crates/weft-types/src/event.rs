//! Room events as delivered by sync and history requests.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{EventId, UserId};

/// Event type strings the timeline understands.
pub mod event_types {
    pub const MESSAGE: &str = "m.room.message";
    pub const NAME: &str = "m.room.name";
    pub const MEMBER: &str = "m.room.member";
    pub const TOPIC: &str = "m.room.topic";
}

/// A single room event.
///
/// `content` is kept as raw JSON; typed accessors below pull out the handful
/// of fields the timeline renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub event_id: EventId,
    pub sender: UserId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub origin_server_ts: u64,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
}

impl RoomEvent {
    pub fn new(
        event_id: impl Into<EventId>,
        sender: impl Into<UserId>,
        event_type: impl Into<String>,
        origin_server_ts: u64,
        content: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            sender: sender.into(),
            event_type: event_type.into(),
            origin_server_ts,
            content,
            state_key: None,
        }
    }

    pub fn with_state_key(mut self, state_key: impl Into<String>) -> Self {
        self.state_key = Some(state_key.into());
        self
    }

    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(|v| v.as_str())
    }

    /// `content.body` of a message event.
    pub fn body(&self) -> Option<&str> {
        self.content_str("body")
    }

    /// `content.msgtype` of a message event.
    pub fn msgtype(&self) -> Option<&str> {
        self.content_str("msgtype")
    }

    /// `content.name` of a room name event.
    pub fn room_name(&self) -> Option<&str> {
        self.content_str("name")
    }

    /// `content.membership` of a member event.
    pub fn membership(&self) -> Option<Membership> {
        self.content_str("membership").and_then(Membership::from_str)
    }
}

/// Membership state of a user in a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Membership {
    #[default]
    Join,
    Leave,
    Invite,
}

impl Membership {
    /// Parse from string, returning None for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Join => "join",
            Membership::Leave => "leave",
            Membership::Invite => "invite",
        }
    }
}
