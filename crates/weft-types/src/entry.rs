//! Timeline entries: events and fragment boundaries.
//!
//! Every fragment contributes two boundary entries, one at each edge, keyed
//! [`EventKey::fragment_start`] and [`EventKey::fragment_end`]. A boundary whose
//! edge still has a pagination token is a *gap*: history on that side hasn't
//! been fetched. Once the edge is linked to a neighbour fragment the token is
//! cleared and the boundary is just a seam.

use serde::{Deserialize, Serialize};

use crate::event::RoomEvent;
use crate::fragment::Fragment;
use crate::ids::{EventId, FragmentId, UserId};
use crate::key::{Direction, EventKey};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub sort_key: EventKey,
    pub content: EntryContent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContent {
    Event(RoomEvent),
    Boundary(FragmentBoundary),
}

/// One edge of a fragment as seen from the timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentBoundary {
    pub fragment_id: FragmentId,
    /// `Backward` for the fragment's start, `Forward` for its end.
    pub direction: Direction,
    pub token: Option<String>,
    pub linked_fragment_id: Option<FragmentId>,
}

impl Entry {
    pub fn event(sort_key: EventKey, event: RoomEvent) -> Self {
        Self {
            sort_key,
            content: EntryContent::Event(event),
        }
    }

    pub fn fragment_start(fragment: &Fragment) -> Self {
        Self::boundary(fragment, Direction::Backward)
    }

    pub fn fragment_end(fragment: &Fragment) -> Self {
        Self::boundary(fragment, Direction::Forward)
    }

    /// Boundary entry for the `direction` edge of `fragment`.
    pub fn boundary(fragment: &Fragment, direction: Direction) -> Self {
        let sort_key = match direction {
            Direction::Backward => EventKey::fragment_start(fragment.id),
            Direction::Forward => EventKey::fragment_end(fragment.id),
        };
        Self {
            sort_key,
            content: EntryContent::Boundary(FragmentBoundary {
                fragment_id: fragment.id,
                direction,
                token: fragment.token(direction).map(str::to_string),
                linked_fragment_id: fragment.linked_fragment(direction),
            }),
        }
    }

    pub fn as_event(&self) -> Option<&RoomEvent> {
        match &self.content {
            EntryContent::Event(event) => Some(event),
            EntryContent::Boundary(_) => None,
        }
    }

    pub fn as_boundary(&self) -> Option<&FragmentBoundary> {
        match &self.content {
            EntryContent::Boundary(boundary) => Some(boundary),
            EntryContent::Event(_) => None,
        }
    }

    /// True for a boundary that still holds a pagination token.
    pub fn is_gap(&self) -> bool {
        self.as_boundary().is_some_and(|b| b.token.is_some())
    }

    pub fn fragment_id(&self) -> FragmentId {
        self.sort_key.fragment_id
    }

    pub fn event_id(&self) -> Option<&EventId> {
        self.as_event().map(|e| &e.event_id)
    }

    pub fn sender(&self) -> Option<&UserId> {
        self.as_event().map(|e| &e.sender)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.as_event().map(|e| e.event_type.as_str())
    }
}
