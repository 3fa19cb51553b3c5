//! Timeline fragments and their relative order.
//!
//! A fragment is one contiguous run of history: the live stream since the last
//! limited sync, or a page range filled by back-pagination. Fragments point at
//! their neighbours through `previous_id`/`next_id`. A fragment edge with no
//! linked neighbour but a pagination token is a gap; with neither it's the
//! start of the room (backward) or the live end (forward).
//!
//! [`FragmentIdComparer`] turns those links into a total order so sort keys
//! from different fragments can be compared.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ids::{FragmentId, RoomId};
use crate::key::{Direction, EventKey};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub room_id: RoomId,
    pub id: FragmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<FragmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<FragmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl Fragment {
    /// An unlinked fragment with no tokens.
    pub fn new(room_id: RoomId, id: FragmentId) -> Self {
        Self {
            room_id,
            id,
            previous_id: None,
            next_id: None,
            previous_token: None,
            next_token: None,
        }
    }

    /// Neighbour on the `direction` edge.
    pub fn linked_fragment(&self, direction: Direction) -> Option<FragmentId> {
        match direction {
            Direction::Backward => self.previous_id,
            Direction::Forward => self.next_id,
        }
    }

    /// Pagination token on the `direction` edge.
    pub fn token(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Backward => self.previous_token.as_deref(),
            Direction::Forward => self.next_token.as_deref(),
        }
    }

    pub fn set_token(&mut self, direction: Direction, token: Option<String>) {
        match direction {
            Direction::Backward => self.previous_token = token,
            Direction::Forward => self.next_token = token,
        }
    }

    pub fn set_linked_fragment(&mut self, direction: Direction, id: Option<FragmentId>) {
        match direction {
            Direction::Backward => self.previous_id = id,
            Direction::Forward => self.next_id = id,
        }
    }

    /// The live fragment is the one sync appends to: nothing after it.
    pub fn is_live(&self) -> bool {
        self.next_id.is_none() && self.next_token.is_none()
    }
}

// ============================================================================
// FragmentIdComparer
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct Link {
    previous: Option<FragmentId>,
    next: Option<FragmentId>,
}

#[derive(Clone, Copy, Debug)]
struct Position {
    island_head: FragmentId,
    index: usize,
}

#[derive(Default)]
struct ComparerState {
    links: HashMap<FragmentId, Link>,
    positions: HashMap<FragmentId, Position>,
}

impl ComparerState {
    /// Recompute island membership from the link table.
    ///
    /// An island is a maximal chain of fragments connected by known links. Heads
    /// are fragments whose previous neighbour is absent or unknown. Anything
    /// left unvisited after walking from every head is part of a cycle and
    /// becomes its own head, lowest id first.
    fn rebuild(&mut self) {
        self.positions.clear();
        let mut heads: Vec<FragmentId> = self
            .links
            .iter()
            .filter(|(_, link)| link.previous.is_none_or(|p| !self.links.contains_key(&p)))
            .map(|(id, _)| *id)
            .collect();
        heads.sort_by_key(|id| id.0);

        let mut visited = HashSet::new();
        for head in heads {
            self.walk_island(head, &mut visited);
        }

        let mut stragglers: Vec<FragmentId> = self
            .links
            .keys()
            .filter(|id| !visited.contains(*id))
            .copied()
            .collect();
        stragglers.sort_by_key(|id| id.0);
        for head in stragglers {
            if !visited.contains(&head) {
                self.walk_island(head, &mut visited);
            }
        }
    }

    fn walk_island(&mut self, head: FragmentId, visited: &mut HashSet<FragmentId>) {
        let mut current = Some(head);
        let mut index = 0;
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            self.positions.insert(
                id,
                Position {
                    island_head: head,
                    index,
                },
            );
            index += 1;
            current = self
                .links
                .get(&id)
                .and_then(|link| link.next)
                .filter(|next| self.links.contains_key(next));
        }
    }
}

/// Orders fragment ids by following their previous/next links.
///
/// Shared between a room, its open timeline, and the persistence writers via
/// `Rc`; every fragment a reader or writer touches is registered with
/// [`add`](Self::add) before keys in it are compared.
#[derive(Default)]
pub struct FragmentIdComparer {
    state: RefCell<ComparerState>,
}

impl FragmentIdComparer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragments<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> Self {
        let comparer = Self::new();
        comparer.add_all(fragments);
        comparer
    }

    /// Register or refresh one fragment's links.
    pub fn add(&self, fragment: &Fragment) {
        self.add_all(std::iter::once(fragment));
    }

    pub fn add_all<'a>(&self, fragments: impl IntoIterator<Item = &'a Fragment>) {
        let mut state = self.state.borrow_mut();
        let mut changed = false;
        for fragment in fragments {
            let link = Link {
                previous: fragment.previous_id,
                next: fragment.next_id,
            };
            let prior = state.links.insert(fragment.id, link);
            changed |= prior.is_none_or(|p| p.previous != link.previous || p.next != link.next);
        }
        if changed {
            state.rebuild();
        }
    }

    pub fn contains(&self, id: FragmentId) -> bool {
        self.state.borrow().links.contains_key(&id)
    }

    /// Total order over fragment ids.
    ///
    /// Fragments on the same island compare by chain position. Fragments on
    /// different islands (or unknown to the comparer) have no defined order;
    /// they fall back to the island head's id so sorting stays deterministic.
    pub fn compare(&self, a: FragmentId, b: FragmentId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let state = self.state.borrow();
        match (state.positions.get(&a), state.positions.get(&b)) {
            (Some(pa), Some(pb)) if pa.island_head == pb.island_head => pa.index.cmp(&pb.index),
            (Some(pa), Some(pb)) => {
                warn!(a = %a, b = %b, "comparing fragments on unconnected islands");
                pa.island_head.0.cmp(&pb.island_head.0)
            }
            _ => {
                warn!(a = %a, b = %b, "comparing unregistered fragment");
                a.0.cmp(&b.0)
            }
        }
    }

    /// Compare two sort keys, delegating the fragment part to [`compare`](Self::compare).
    pub fn compare_keys(&self, a: &EventKey, b: &EventKey) -> Ordering {
        self.compare(a.fragment_id, b.fragment_id)
            .then(a.event_index.cmp(&b.event_index))
    }
}

impl std::fmt::Debug for FragmentIdComparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentIdComparer")
            .field("fragments", &self.state.borrow().links.len())
            .finish()
    }
}
