//! One-line announcements of room state changes.

use std::cmp::Ordering;

use weft_observable::UpdateParams;
use weft_types::{Entry, EventKey, FragmentId, FragmentIdComparer, Membership, event_types};

use super::{Tile, TileBehavior, TileShape, TileUpdate, TileView};

/// `m.room.name`: "alice named the room "Lobby"".
#[derive(Clone, Debug, PartialEq)]
pub struct RoomNameTile {
    entry: Entry,
}

impl RoomNameTile {
    pub fn new(entry: &Entry) -> Option<Self> {
        entry.as_event()?.room_name()?;
        Some(Self { entry: entry.clone() })
    }

    pub fn text(&self) -> String {
        let Some(event) = self.entry.as_event() else {
            return String::new();
        };
        let name = event.room_name().unwrap_or_default();
        format!("{} named the room \"{name}\"", event.sender.localpart())
    }
}

impl TileBehavior for RoomNameTile {
    fn shape(&self) -> TileShape {
        TileShape::Announcement
    }

    fn lower_key(&self) -> EventKey {
        self.entry.sort_key
    }

    fn upper_key(&self) -> EventKey {
        self.entry.sort_key
    }

    fn update_entry(&mut self, entry: &Entry, params: Option<&UpdateParams>) -> TileUpdate {
        self.entry = entry.clone();
        TileUpdate::Update(params.cloned())
    }

    fn remove_entry(&mut self, _entry: &Entry) -> bool {
        true
    }

    fn view(&self) -> TileView {
        TileView::Announcement { text: self.text() }
    }
}

/// A run of consecutive `m.room.member` events, e.g. "alice joined, bob left".
#[derive(Clone, Debug, PartialEq)]
pub struct MembershipTile {
    /// Covered entries in ascending key order. Never empty while the tile is alive.
    entries: Vec<Entry>,
}

impl MembershipTile {
    pub fn new(entry: &Entry) -> Option<Self> {
        entry.as_event()?.membership()?;
        Some(Self {
            entries: vec![entry.clone()],
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn text(&self) -> String {
        self.entries
            .iter()
            .filter_map(describe)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn position(&self, key: &EventKey) -> Option<usize> {
        self.entries.iter().position(|e| e.sort_key == *key)
    }
}

fn describe(entry: &Entry) -> Option<String> {
    let event = entry.as_event()?;
    let who = event
        .state_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .unwrap_or(event.sender.as_str());
    let who = who
        .strip_prefix('@')
        .and_then(|rest| rest.split(':').next())
        .unwrap_or(who);
    let what = match event.membership()? {
        Membership::Join => "joined",
        Membership::Leave if event.state_key.as_deref() != Some(event.sender.as_str()) => "was removed",
        Membership::Leave => "left",
        Membership::Invite => "was invited",
    };
    Some(format!("{who} {what}"))
}

impl TileBehavior for MembershipTile {
    fn shape(&self) -> TileShape {
        TileShape::Announcement
    }

    fn lower_key(&self) -> EventKey {
        self.entries
            .first()
            .map_or(EventKey::fragment_start(FragmentId(0)), |e| e.sort_key)
    }

    fn upper_key(&self) -> EventKey {
        self.entries
            .last()
            .map_or(EventKey::fragment_start(FragmentId(0)), |e| e.sort_key)
    }

    fn try_include_entry(&mut self, entry: &Entry, comparer: &FragmentIdComparer) -> bool {
        if !entry.as_event().is_some_and(|e| e.is_type(event_types::MEMBER) && e.membership().is_some()) {
            return false;
        }
        let index = self
            .entries
            .partition_point(|e| comparer.compare_keys(&e.sort_key, &entry.sort_key) == Ordering::Less);
        if self.entries.get(index).is_some_and(|e| e.sort_key == entry.sort_key) {
            return false;
        }
        self.entries.insert(index, entry.clone());
        true
    }

    fn split_off(&mut self, key: &EventKey, comparer: &FragmentIdComparer) -> Option<Tile> {
        let at = self
            .entries
            .partition_point(|e| comparer.compare_keys(&e.sort_key, key) != Ordering::Greater);
        if at == 0 || at == self.entries.len() {
            return None;
        }
        Some(Tile::Membership(MembershipTile {
            entries: self.entries.split_off(at),
        }))
    }

    fn try_merge_next(&mut self, next: &Tile) -> bool {
        let Tile::Membership(next) = next else {
            return false;
        };
        self.entries.extend(next.entries.iter().cloned());
        true
    }

    fn update_entry(&mut self, entry: &Entry, params: Option<&UpdateParams>) -> TileUpdate {
        match self.position(&entry.sort_key) {
            Some(index) => {
                self.entries[index] = entry.clone();
                TileUpdate::Update(params.cloned())
            }
            None => TileUpdate::Unchanged,
        }
    }

    fn remove_entry(&mut self, entry: &Entry) -> bool {
        if let Some(index) = self.position(&entry.sort_key) {
            self.entries.remove(index);
        }
        self.entries.is_empty()
    }

    fn view(&self) -> TileView {
        TileView::Announcement { text: self.text() }
    }
}
