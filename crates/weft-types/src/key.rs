//! Fragment-relative sort keys.
//!
//! An [`EventKey`] places an entry inside its fragment. Indices grow forward in
//! time; a fragment's first live key sits at [`EventKey::MIDDLE_INDEX`] so
//! history can be prepended backwards and live events appended forwards without
//! renumbering. `MIN_INDEX` and `MAX_INDEX` are reserved for the fragment's
//! start and end boundary entries.
//!
//! Keys in different fragments are not comparable on their own; ordering across
//! fragments goes through [`crate::FragmentIdComparer::compare_keys`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::FragmentId;

#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventKey {
    pub fragment_id: FragmentId,
    pub event_index: u32,
}

impl EventKey {
    pub const MIN_INDEX: u32 = 0;
    pub const MAX_INDEX: u32 = u32::MAX;
    pub const MIDDLE_INDEX: u32 = 0x8000_0000;

    pub fn new(fragment_id: FragmentId, event_index: u32) -> Self {
        Self {
            fragment_id,
            event_index,
        }
    }

    /// Key of the first event written into a fresh fragment.
    pub fn default_live_key(fragment_id: FragmentId) -> Self {
        Self::new(fragment_id, Self::MIDDLE_INDEX)
    }

    /// Key of the fragment's start boundary entry.
    pub fn fragment_start(fragment_id: FragmentId) -> Self {
        Self::new(fragment_id, Self::MIN_INDEX)
    }

    /// Key of the fragment's end boundary entry.
    pub fn fragment_end(fragment_id: FragmentId) -> Self {
        Self::new(fragment_id, Self::MAX_INDEX)
    }

    /// The key one step later in the same fragment.
    ///
    /// Saturates just below `MAX_INDEX`; a fragment holding two billion events
    /// past its middle is not a case worth a dedicated error.
    pub fn next_key(self) -> Self {
        Self::new(
            self.fragment_id,
            self.event_index.saturating_add(1).min(Self::MAX_INDEX - 1),
        )
    }

    /// The key one step earlier in the same fragment, saturating above `MIN_INDEX`.
    pub fn previous_key(self) -> Self {
        Self::new(
            self.fragment_id,
            self.event_index.saturating_sub(1).max(Self::MIN_INDEX + 1),
        )
    }

    /// Step one key in `direction`.
    pub fn next_key_in(self, direction: Direction) -> Self {
        match direction {
            Direction::Forward => self.next_key(),
            Direction::Backward => self.previous_key(),
        }
    }

    pub fn is_fragment_boundary(&self) -> bool {
        self.event_index == Self::MIN_INDEX || self.event_index == Self::MAX_INDEX
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKey({}:{:#x})", self.fragment_id, self.event_index)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fragment_id, self.event_index)
    }
}

/// Pagination direction, also used for the edge a boundary entry sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    /// Towards older history.
    #[default]
    #[strum(serialize = "backward", serialize = "b")]
    Backward,
    /// Towards newer events.
    #[strum(serialize = "forward", serialize = "f")]
    Forward,
}

impl Direction {
    /// Parse from string, returning None for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Backward => "backward",
            Direction::Forward => "forward",
        }
    }

    /// The single-letter form history requests use (`dir=b`).
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Direction::Backward => "b",
            Direction::Forward => "f",
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Backward => Direction::Forward,
            Direction::Forward => Direction::Backward,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_keys_bracket_live_keys() {
        let f = FragmentId(3);
        let live = EventKey::default_live_key(f);
        assert!(EventKey::fragment_start(f).event_index < live.event_index);
        assert!(EventKey::fragment_end(f).event_index > live.event_index);
        assert!(EventKey::fragment_start(f).is_fragment_boundary());
        assert!(!live.is_fragment_boundary());
    }

    #[test]
    fn test_key_steps_never_reach_boundaries() {
        let f = FragmentId(1);
        let near_end = EventKey::new(f, EventKey::MAX_INDEX - 1);
        assert_eq!(near_end.next_key().event_index, EventKey::MAX_INDEX - 1);
        let near_start = EventKey::new(f, 1);
        assert_eq!(near_start.previous_key().event_index, 1);
        let mid = EventKey::default_live_key(f);
        assert_eq!(mid.next_key_in(Direction::Forward).event_index, EventKey::MIDDLE_INDEX + 1);
        assert_eq!(mid.next_key_in(Direction::Backward).event_index, EventKey::MIDDLE_INDEX - 1);
    }

    #[test]
    fn test_direction_strings() {
        assert_eq!(Direction::from_str("b"), Some(Direction::Backward));
        assert_eq!(Direction::from_str("Forward"), Some(Direction::Forward));
        assert_eq!(Direction::from_str("sideways"), None);
        assert_eq!(Direction::Backward.as_api_str(), "b");
        assert_eq!(Direction::Forward.reverse(), Direction::Backward);
    }
}
