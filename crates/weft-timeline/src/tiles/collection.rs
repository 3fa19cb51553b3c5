//! The derived tile list.
//!
//! `TilesCollection` listens to a room's sorted entry list and keeps an
//! ordered list of tiles over it. Work only happens while someone is
//! subscribed: the first subscriber attaches to the entry list and builds
//! the tiles in one pass; the last one to leave detaches and drops them.
//!
//! Tiles live in an arena. Sibling links are `TileId`s into that arena, never
//! owning pointers, so teardown is just clearing it.
//!
//! Tile order always matches key order. A tile that lands inside a membership
//! run splits the run; when the tile between two runs goes away the runs are
//! merged back, so incremental edits end up where a rebuild would.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use weft_observable::{ListObserver, ObservableList, Observers, SortedArray, SubscriptionId, Transition, UpdateParams};
use weft_types::{Entry, EventKey, FragmentIdComparer};

use super::{SiblingInfo, Tile, TileBehavior, TileCreator, TileUpdate, TileView};

/// Stable handle to a tile for as long as it stays in the collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileId(usize);

struct Slot {
    tile: Tile,
    prev: Option<TileId>,
    next: Option<TileId>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    order: Vec<TileId>,
}

impl Arena {
    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn slot(&self, id: TileId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: TileId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn tile(&self, index: usize) -> Option<&Tile> {
        let id = *self.order.get(index)?;
        self.slot(id).map(|slot| &slot.tile)
    }

    fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        let id = *self.order.get(index)?;
        self.slot_mut(id).map(|slot| &mut slot.tile)
    }

    fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.order
            .iter()
            .filter_map(|id| self.slot(*id).map(|slot| &slot.tile))
    }

    fn sibling_info(&self, index: Option<usize>) -> Option<SiblingInfo> {
        index.and_then(|i| self.tile(i)).map(Tile::sibling_info)
    }

    fn insert_at(&mut self, index: usize, tile: Tile) -> TileId {
        let prev = index.checked_sub(1).and_then(|i| self.order.get(i).copied());
        let next = self.order.get(index).copied();
        let slot = Slot { tile, prev, next };
        let id = match self.free.pop() {
            Some(free) => {
                self.slots[free] = Some(slot);
                TileId(free)
            }
            None => {
                self.slots.push(Some(slot));
                TileId(self.slots.len() - 1)
            }
        };
        if let Some(prev) = prev.and_then(|p| self.slot_mut(p)) {
            prev.next = Some(id);
        }
        if let Some(next) = next.and_then(|n| self.slot_mut(n)) {
            next.prev = Some(id);
        }
        self.order.insert(index, id);
        id
    }

    fn remove_at(&mut self, index: usize) -> Option<Tile> {
        if index >= self.order.len() {
            return None;
        }
        let id = self.order.remove(index);
        let slot = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        if let Some(prev) = slot.prev.and_then(|p| self.slot_mut(p)) {
            prev.next = slot.next;
        }
        if let Some(next) = slot.next.and_then(|n| self.slot_mut(n)) {
            next.prev = slot.prev;
        }
        Some(slot.tile)
    }
}

/// A change to publish once the arena borrow is released.
enum Delta {
    Reset(Vec<Tile>),
    Add(usize, Tile),
    Update(usize, Tile, Option<UpdateParams>),
    Remove(usize, Tile),
}

/// Observable list of tiles derived from an entry list.
pub struct TilesCollection {
    this: Weak<TilesCollection>,
    entries: Rc<RefCell<SortedArray<Entry>>>,
    comparer: Rc<FragmentIdComparer>,
    creator: TileCreator,
    arena: RefCell<Arena>,
    observers: RefCell<Observers<dyn ListObserver<Tile>>>,
    entry_subscription: Cell<Option<SubscriptionId>>,
}

impl TilesCollection {
    pub fn new(
        entries: Rc<RefCell<SortedArray<Entry>>>,
        comparer: Rc<FragmentIdComparer>,
        creator: TileCreator,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            entries,
            comparer,
            creator,
            arena: RefCell::new(Arena::default()),
            observers: RefCell::new(Observers::new()),
            entry_subscription: Cell::new(None),
        })
    }

    /// True while at least one subscriber is attached.
    pub fn is_active(&self) -> bool {
        self.observers.borrow().is_active()
    }

    /// Tile at `index`. Empty while inactive.
    pub fn get(&self, index: usize) -> Option<Tile> {
        self.arena.borrow().tile(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Tile> {
        self.arena.borrow().tiles().cloned().collect()
    }

    pub fn views(&self) -> Vec<TileView> {
        self.arena.borrow().tiles().map(Tile::view).collect()
    }

    pub fn id_at(&self, index: usize) -> Option<TileId> {
        self.arena.borrow().order.get(index).copied()
    }

    /// Previous and next sibling of `id`, or `None` if `id` is not live.
    pub fn siblings(&self, id: TileId) -> Option<(Option<TileId>, Option<TileId>)> {
        self.arena.borrow().slot(id).map(|slot| (slot.prev, slot.next))
    }

    // ========================================================================
    // Activation
    // ========================================================================

    fn activate(&self) {
        let feed: Rc<RefCell<dyn ListObserver<Entry>>> = Rc::new(RefCell::new(EntryFeed {
            tiles: self.this.clone(),
        }));
        let entries = self.entries.borrow();
        self.entry_subscription.set(Some(entries.subscribe(feed)));
        let mut arena = self.arena.borrow_mut();
        self.rebuild(&mut arena, entries.iter());
        debug!(tiles = arena.len(), entries = entries.len(), "tiles collection activated");
    }

    fn deactivate(&self) {
        if let Some(id) = self.entry_subscription.take() {
            self.entries.borrow().unsubscribe(id);
        }
        self.arena.borrow_mut().clear();
        debug!("tiles collection deactivated");
    }

    // ========================================================================
    // Entry deltas
    // ========================================================================

    fn handle_reset(&self, entries: &mut dyn Iterator<Item = &Entry>) {
        let tiles = {
            let mut arena = self.arena.borrow_mut();
            self.rebuild(&mut arena, entries);
            arena.tiles().cloned().collect()
        };
        self.publish(vec![Delta::Reset(tiles)]);
    }

    fn handle_add(&self, entry: &Entry) {
        let mut deltas = Vec::new();
        self.add_entry(&mut self.arena.borrow_mut(), entry, &mut deltas);
        self.publish(deltas);
    }

    fn handle_update(&self, entry: &Entry, params: Option<&UpdateParams>) {
        let mut deltas = Vec::new();
        self.update_entry(&mut self.arena.borrow_mut(), entry, params, &mut deltas);
        self.publish(deltas);
    }

    fn handle_remove(&self, entry: &Entry) {
        let mut deltas = Vec::new();
        self.remove_entry(&mut self.arena.borrow_mut(), entry, &mut deltas);
        self.publish(deltas);
    }

    /// One left-to-right pass, then a sibling pass. Emits nothing.
    fn rebuild<'a>(&self, arena: &mut Arena, entries: impl Iterator<Item = &'a Entry>) {
        arena.clear();
        for entry in entries {
            let last = arena.len().checked_sub(1);
            if let Some(current) = last.and_then(|i| arena.tile_mut(i))
                && current.try_include_entry(entry, &self.comparer)
            {
                continue;
            }
            if let Some(tile) = self.creator.create(entry) {
                arena.insert_at(arena.len(), tile);
            }
        }
        for index in 0..arena.len() {
            let prev = arena.sibling_info(index.checked_sub(1));
            let next = arena.sibling_info(Some(index + 1));
            if let Some(tile) = arena.tile_mut(index) {
                tile.update_previous_sibling(prev.as_ref());
                tile.update_next_sibling(next.as_ref());
            }
        }
    }

    /// First tile position not entirely before `key`.
    fn find_index(&self, arena: &Arena, key: &EventKey) -> usize {
        arena.order.partition_point(|id| {
            arena
                .slot(*id)
                .is_some_and(|slot| slot.tile.compare_sort_key(key, &self.comparer) == Ordering::Less)
        })
    }

    /// Position of the tile covering `key`.
    fn find_exact(&self, arena: &Arena, key: &EventKey) -> Option<usize> {
        let index = self.find_index(arena, key);
        arena
            .tile(index)
            .filter(|tile| tile.compare_sort_key(key, &self.comparer) == Ordering::Equal)
            .map(|_| index)
    }

    fn add_entry(&self, arena: &mut Arena, entry: &Entry, deltas: &mut Vec<Delta>) {
        let index = self.find_index(arena, &entry.sort_key);
        // an entry inside a tile's range may only join that tile; otherwise
        // it may extend the tile on either side of it
        let spanned = arena
            .tile(index)
            .is_some_and(|tile| tile.compare_sort_key(&entry.sort_key, &self.comparer) == Ordering::Equal);
        let candidates = if spanned {
            [Some(index), None]
        } else {
            [index.checked_sub(1), Some(index)]
        };
        for candidate in candidates.into_iter().flatten() {
            if let Some(tile) = arena.tile_mut(candidate)
                && tile.try_include_entry(entry, &self.comparer)
            {
                deltas.push(Delta::Update(candidate, tile.clone(), None));
                return;
            }
        }
        let Some(mut tile) = self.creator.create(entry) else {
            trace!(key = %entry.sort_key, "entry has no tile");
            return;
        };
        let index = self.split_around(arena, index, &entry.sort_key, deltas);
        let prev = arena.sibling_info(index.checked_sub(1));
        let next = arena.sibling_info(Some(index));
        tile.update_previous_sibling(prev.as_ref());
        tile.update_next_sibling(next.as_ref());
        let info = tile.sibling_info();
        arena.insert_at(index, tile.clone());
        deltas.push(Delta::Add(index, tile));

        if let Some(prev_index) = index.checked_sub(1) {
            self.notify_next_changed(arena, prev_index, Some(&info), deltas);
        }
        self.notify_previous_changed(arena, index + 1, Some(&info), deltas);
    }

    /// If the tile at `index` spans `key`, cut it in two so a new tile can
    /// go between the halves. Returns the insertion index for that tile.
    fn split_around(&self, arena: &mut Arena, index: usize, key: &EventKey, deltas: &mut Vec<Delta>) -> usize {
        let Some(tile) = arena.tile_mut(index) else {
            return index;
        };
        if tile.compare_sort_key(key, &self.comparer) != Ordering::Equal {
            return index;
        }
        let Some(upper) = tile.split_off(key, &self.comparer) else {
            return index;
        };
        deltas.push(Delta::Update(index, tile.clone(), None));
        arena.insert_at(index + 1, upper.clone());
        deltas.push(Delta::Add(index + 1, upper));
        trace!(index, key = %key, "split tile");
        index + 1
    }

    /// Tiles at `index - 1` and `index` became neighbours; fold them together
    /// if they form one run.
    fn merge_at(&self, arena: &mut Arena, index: usize, deltas: &mut Vec<Delta>) {
        let Some(prev_index) = index.checked_sub(1) else {
            return;
        };
        let Some(next) = arena.tile(index).cloned() else {
            return;
        };
        let Some(prev) = arena.tile_mut(prev_index) else {
            return;
        };
        if !prev.try_merge_next(&next) {
            return;
        }
        let merged = prev.clone();
        arena.remove_at(index);
        deltas.push(Delta::Remove(index, next));
        deltas.push(Delta::Update(prev_index, merged, None));
        trace!(index = prev_index, "merged neighbouring tiles");
    }

    fn update_entry(&self, arena: &mut Arena, entry: &Entry, params: Option<&UpdateParams>, deltas: &mut Vec<Delta>) {
        let Some(index) = self.find_exact(arena, &entry.sort_key) else {
            trace!(key = %entry.sort_key, "updated entry has no tile");
            return;
        };
        let prev = arena.sibling_info(index.checked_sub(1));
        let next = arena.sibling_info(Some(index + 1));
        let Some(tile) = arena.tile_mut(index) else {
            return;
        };
        match tile.update_entry(entry, params) {
            TileUpdate::Unchanged => {}
            TileUpdate::Update(params) => {
                // the new content may relate differently to the neighbours
                tile.update_previous_sibling(prev.as_ref());
                tile.update_next_sibling(next.as_ref());
                deltas.push(Delta::Update(index, tile.clone(), params));
                let info = tile.sibling_info();
                if let Some(prev_index) = index.checked_sub(1) {
                    self.notify_next_changed(arena, prev_index, Some(&info), deltas);
                }
                self.notify_previous_changed(arena, index + 1, Some(&info), deltas);
            }
            TileUpdate::Remove => self.remove_tile(arena, index, deltas),
        }
    }

    fn remove_entry(&self, arena: &mut Arena, entry: &Entry, deltas: &mut Vec<Delta>) {
        let Some(index) = self.find_exact(arena, &entry.sort_key) else {
            return;
        };
        let Some(tile) = arena.tile_mut(index) else {
            return;
        };
        if tile.remove_entry(entry) {
            self.remove_tile(arena, index, deltas);
        } else {
            deltas.push(Delta::Update(index, tile.clone(), None));
        }
    }

    fn remove_tile(&self, arena: &mut Arena, index: usize, deltas: &mut Vec<Delta>) {
        let Some(tile) = arena.remove_at(index) else {
            return;
        };
        deltas.push(Delta::Remove(index, tile));
        self.merge_at(arena, index, deltas);
        // former neighbours now face each other
        let prev = arena.sibling_info(index.checked_sub(1));
        let next = arena.sibling_info(Some(index));
        if let Some(prev_index) = index.checked_sub(1) {
            self.notify_next_changed(arena, prev_index, next.as_ref(), deltas);
        }
        self.notify_previous_changed(arena, index, prev.as_ref(), deltas);
    }

    fn notify_previous_changed(&self, arena: &mut Arena, index: usize, prev: Option<&SiblingInfo>, deltas: &mut Vec<Delta>) {
        if let Some(tile) = arena.tile_mut(index)
            && let Some(params) = tile.update_previous_sibling(prev)
        {
            deltas.push(Delta::Update(index, tile.clone(), Some(params)));
        }
    }

    fn notify_next_changed(&self, arena: &mut Arena, index: usize, next: Option<&SiblingInfo>, deltas: &mut Vec<Delta>) {
        if let Some(tile) = arena.tile_mut(index)
            && let Some(params) = tile.update_next_sibling(next)
        {
            deltas.push(Delta::Update(index, tile.clone(), Some(params)));
        }
    }

    fn publish(&self, deltas: Vec<Delta>) {
        let observers = self.observers.borrow();
        for delta in deltas {
            match delta {
                Delta::Reset(tiles) => observers.for_each(|o| o.on_reset(&mut tiles.iter())),
                Delta::Add(index, tile) => observers.for_each(|o| o.on_add(index, &tile)),
                Delta::Update(index, tile, params) => observers.for_each(|o| o.on_update(index, &tile, params.as_ref())),
                Delta::Remove(index, tile) => observers.for_each(|o| o.on_remove(index, &tile)),
            }
        }
    }
}

impl ObservableList<Tile> for TilesCollection {
    fn subscribe(&self, observer: Rc<RefCell<dyn ListObserver<Tile>>>) -> SubscriptionId {
        let (id, transition) = self.observers.borrow_mut().add(observer);
        if transition == Transition::Activated {
            self.activate();
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let transition = self.observers.borrow_mut().remove(id);
        if transition == Some(Transition::Deactivated) {
            self.deactivate();
        }
        transition.is_some()
    }

    fn len(&self) -> usize {
        self.arena.borrow().len()
    }
}

impl Drop for TilesCollection {
    fn drop(&mut self) {
        if let Some(id) = self.entry_subscription.take()
            && let Ok(entries) = self.entries.try_borrow()
        {
            entries.unsubscribe(id);
        }
    }
}

/// Forwards entry deltas to the collection without keeping it alive.
struct EntryFeed {
    tiles: Weak<TilesCollection>,
}

impl ListObserver<Entry> for EntryFeed {
    fn on_reset(&mut self, items: &mut dyn Iterator<Item = &Entry>) {
        if let Some(tiles) = self.tiles.upgrade() {
            tiles.handle_reset(items);
        }
    }

    fn on_add(&mut self, _index: usize, item: &Entry) {
        if let Some(tiles) = self.tiles.upgrade() {
            tiles.handle_add(item);
        }
    }

    fn on_update(&mut self, _index: usize, item: &Entry, params: Option<&UpdateParams>) {
        if let Some(tiles) = self.tiles.upgrade() {
            tiles.handle_update(item, params);
        }
    }

    fn on_remove(&mut self, _index: usize, item: &Entry) {
        if let Some(tiles) = self.tiles.upgrade() {
            tiles.handle_remove(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::tiles::test_entries::{gap, key, member, message, message_at, room_name};
    use weft_observable::testing::{ListEvent, ListRecorder};
    use weft_types::{Direction, EntryContent, FragmentBoundary, FragmentId, RoomEvent, event_types};

    struct Fixture {
        entries: Rc<RefCell<SortedArray<Entry>>>,
        tiles: Rc<TilesCollection>,
        recorder: Rc<RefCell<ListRecorder<Tile>>>,
        subscription: SubscriptionId,
    }

    fn fixture(initial: Vec<Entry>) -> Fixture {
        let comparer = Rc::new(FragmentIdComparer::new());
        let cmp = comparer.clone();
        let entries = Rc::new(RefCell::new(SortedArray::new(move |a: &Entry, b: &Entry| {
            cmp.compare_keys(&a.sort_key, &b.sort_key)
        })));
        entries.borrow_mut().set_many_sorted(initial);
        let tiles = TilesCollection::new(entries.clone(), comparer, TileCreator::default());
        let recorder = ListRecorder::<Tile>::shared();
        let subscription = tiles.subscribe(recorder.clone());
        Fixture {
            entries,
            tiles,
            recorder,
            subscription,
        }
    }

    impl Fixture {
        fn set(&self, entry: Entry) {
            self.entries.borrow_mut().set(entry, None);
        }

        fn lines(&self) -> Vec<String> {
            self.tiles.views().iter().map(ToString::to_string).collect()
        }

        fn events(&self) -> Vec<ListEvent<Tile>> {
            self.recorder.borrow_mut().take()
        }

        fn assert_links_consistent(&self) {
            for index in 0..self.tiles.len() {
                let id = self.tiles.id_at(index).unwrap();
                let expected_prev = index.checked_sub(1).and_then(|i| self.tiles.id_at(i));
                let expected_next = self.tiles.id_at(index + 1);
                assert_eq!(self.tiles.siblings(id), Some((expected_prev, expected_next)));
            }
        }
    }

    fn feed(f: &Fixture) -> EntryFeed {
        EntryFeed {
            tiles: Rc::downgrade(&f.tiles),
        }
    }

    /// Tiles a fresh collection builds from `entries` in one pass.
    fn rebuilt(entries: Vec<Entry>) -> Vec<Tile> {
        fixture(entries).tiles.snapshot()
    }

    fn gap_at(index: u32, token: Option<&str>) -> Entry {
        Entry {
            sort_key: key(index),
            content: EntryContent::Boundary(FragmentBoundary {
                fragment_id: FragmentId(0),
                direction: Direction::Backward,
                token: token.map(str::to_string),
                linked_fragment_id: None,
            }),
        }
    }

    fn reaction(index: u32) -> Entry {
        let event = RoomEvent::new(
            format!("$r{index}"),
            "@alice:weft.test",
            "m.reaction",
            0,
            serde_json::json!({}),
        );
        Entry::event(key(index), event)
    }

    fn apply(mirror: &mut Vec<Tile>, events: Vec<ListEvent<Tile>>) {
        for event in events {
            match event {
                ListEvent::Reset(tiles) => *mirror = tiles,
                ListEvent::Add(index, tile) => mirror.insert(index, tile),
                ListEvent::Update(index, tile, _) => mirror[index] = tile,
                ListEvent::Remove(index, _) => {
                    mirror.remove(index);
                }
                ListEvent::Move(..) => panic!("tiles never move"),
            }
        }
    }

    fn is_continuation(tile: &Tile) -> bool {
        matches!(tile, Tile::Message(m) if m.is_continuation())
    }

    #[test]
    fn test_activation_builds_tiles_in_one_pass() {
        let f = fixture(vec![
            gap(Some("t0")),
            message(1, "@alice:weft.test", "one"),
            message(2, "@alice:weft.test", "two"),
            member(3, "@bob:weft.test", "join"),
            member(4, "@carol:weft.test", "join"),
            message(5, "@bob:weft.test", "hi"),
        ]);
        assert!(f.tiles.is_active());
        assert_eq!(f.tiles.len(), 5);
        let lines = f.lines();
        assert_eq!(lines[0], "[gap] older history not loaded");
        assert!(lines[1].ends_with("alice: one"));
        assert_eq!(lines[2], "[message]   two");
        assert_eq!(lines[3], "[announcement] bob joined, carol joined");
        assert!(lines[4].ends_with("bob: hi"));
        assert!(f.events().is_empty());
        f.assert_links_consistent();
    }

    #[test]
    fn test_add_emits_add_and_flips_neighbour_continuation() {
        let f = fixture(vec![
            message(1, "@alice:weft.test", "one"),
            message(3, "@alice:weft.test", "three"),
        ]);
        assert!(is_continuation(&f.tiles.get(1).unwrap()));

        f.set(message(2, "@bob:weft.test", "two"));
        let events = f.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ListEvent::Add(1, Tile::Message(m)) if m.body() == "two"));
        match &events[1] {
            ListEvent::Update(2, tile, params) => {
                assert!(!is_continuation(tile));
                assert_eq!(params, &Some(UpdateParams::Field("is_continuation")));
            }
            other => panic!("unexpected {other:?}"),
        }
        f.assert_links_consistent();
    }

    #[test]
    fn test_add_at_head_and_new_continuation() {
        let f = fixture(vec![message(2, "@alice:weft.test", "two")]);
        f.set(message(1, "@bob:weft.test", "one"));
        let events = f.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ListEvent::Add(0, _)));

        f.set(message(3, "@alice:weft.test", "three"));
        let events = f.events();
        assert!(matches!(&events[..], [ListEvent::Add(2, tile)] if is_continuation(tile)));
        f.assert_links_consistent();
    }

    #[test]
    fn test_membership_run_absorbs_neighbouring_entry() {
        let f = fixture(vec![member(1, "@alice:weft.test", "join")]);
        f.set(member(2, "@bob:weft.test", "join"));
        let events = f.events();
        assert!(matches!(&events[..], [ListEvent::Update(0, Tile::Membership(t), None)] if t.len() == 2));
        assert_eq!(f.tiles.len(), 1);
    }

    #[test]
    fn test_same_sender_continues_after_a_long_pause() {
        let f = fixture(vec![message_at(1, "@alice:weft.test", "one", 1_700_000_000_000)]);
        f.set(message_at(2, "@alice:weft.test", "two", 1_700_000_600_000));
        assert!(is_continuation(&f.tiles.get(1).unwrap()));
    }

    #[test]
    fn test_tile_inside_a_run_splits_it() {
        let f = fixture(vec![member(1, "@a:weft.test", "join")]);
        f.set(member(3, "@b:weft.test", "join"));
        f.events();

        f.set(message(2, "@a:weft.test", "hi"));
        let events = f.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ListEvent::Update(0, Tile::Membership(t), None) if t.len() == 1));
        assert!(matches!(&events[1], ListEvent::Add(1, Tile::Membership(t)) if t.len() == 1));
        assert!(matches!(&events[2], ListEvent::Add(1, Tile::Message(_))));

        assert_eq!(f.lines()[0], "[announcement] a joined");
        assert!(f.lines()[1].ends_with("a: hi"));
        assert_eq!(f.lines()[2], "[announcement] b joined");
        assert_eq!(
            f.tiles.snapshot(),
            rebuilt(vec![
                member(1, "@a:weft.test", "join"),
                member(3, "@b:weft.test", "join"),
                message(2, "@a:weft.test", "hi"),
            ])
        );
        f.assert_links_consistent();
    }

    #[test]
    fn test_removing_the_tile_between_runs_merges_them() {
        let f = fixture(vec![
            member(1, "@a:weft.test", "join"),
            message(2, "@a:weft.test", "hi"),
            member(3, "@b:weft.test", "join"),
        ]);
        feed(&f).on_remove(1, &message(2, "@a:weft.test", "hi"));
        let events = f.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ListEvent::Remove(1, Tile::Message(_))));
        assert!(matches!(&events[1], ListEvent::Remove(1, Tile::Membership(_))));
        assert!(matches!(&events[2], ListEvent::Update(0, Tile::Membership(t), None) if t.len() == 2));
        assert_eq!(f.lines(), ["[announcement] a joined, b joined"]);
        f.assert_links_consistent();
    }

    #[test]
    fn test_closing_a_gap_between_runs_merges_them() {
        let f = fixture(vec![
            member(1, "@a:weft.test", "join"),
            gap_at(2, Some("t")),
            member(3, "@b:weft.test", "leave"),
        ]);
        assert_eq!(f.tiles.len(), 3);
        f.set(gap_at(2, None));
        assert_eq!(f.lines(), ["[announcement] a joined, b left"]);
        f.assert_links_consistent();
    }

    #[test]
    fn test_random_edits_match_a_fresh_rebuild() {
        // xorshift32
        let mut state = 0x9e37_79b9u32;
        let mut next = move |bound: u32| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state % bound
        };
        let senders = ["@alice:weft.test", "@bob:weft.test"];
        let memberships = ["join", "leave", "invite"];

        let f = fixture(Vec::new());
        let mut feed = feed(&f);
        let creator = TileCreator::default();
        let comparer = FragmentIdComparer::new();
        let mut live: BTreeMap<u32, Entry> = BTreeMap::new();
        let mut mirror: Vec<Tile> = Vec::new();

        for step in 0..600 {
            let index = next(48);
            match live.get(&index).cloned() {
                None => {
                    let entry = match next(7) {
                        0 | 1 => message(index, senders[next(2) as usize], "m"),
                        2 | 3 => member(index, senders[next(2) as usize], memberships[next(3) as usize]),
                        4 => room_name(index, senders[next(2) as usize], "Den"),
                        5 => gap_at(index, Some("t")),
                        _ => reaction(index),
                    };
                    feed.on_add(0, &entry);
                    live.insert(index, entry);
                }
                Some(entry) if next(3) == 0 => {
                    feed.on_remove(0, &entry);
                    live.remove(&index);
                }
                Some(entry) => {
                    let updated = match entry.as_boundary() {
                        // a closed boundary has no tile to update
                        Some(boundary) if boundary.token.is_none() => continue,
                        Some(_) => gap_at(index, [Some("t2"), None][next(2) as usize]),
                        None => match entry.event_type() {
                            Some(event_types::MESSAGE) => message(index, senders[next(2) as usize], "edited"),
                            Some(event_types::MEMBER) => {
                                member(index, senders[next(2) as usize], memberships[next(3) as usize])
                            }
                            Some(event_types::NAME) => room_name(index, senders[next(2) as usize], "Hall"),
                            _ => continue,
                        },
                    };
                    feed.on_update(0, &updated, None);
                    live.insert(index, updated);
                }
            }

            let tiles = f.tiles.snapshot();
            apply(&mut mirror, f.events());
            assert_eq!(mirror, tiles, "deltas diverged at step {step}");
            assert_eq!(tiles, rebuilt(live.values().cloned().collect()), "step {step}");
            f.assert_links_consistent();

            for pair in tiles.windows(2) {
                assert_eq!(
                    comparer.compare_keys(&pair[0].upper_key(), &pair[1].lower_key()),
                    Ordering::Less,
                    "tiles out of key order at step {step}"
                );
            }
            for entry in live.values().filter(|e| creator.create(e).is_some()) {
                let covering = tiles
                    .iter()
                    .filter(|t| t.compare_sort_key(&entry.sort_key, &comparer) == Ordering::Equal)
                    .count();
                assert_eq!(covering, 1, "entry {} covered {covering} times at step {step}", entry.sort_key);
            }
        }
    }

    #[test]
    fn test_closed_gap_is_removed() {
        let f = fixture(vec![gap(Some("t0")), message(1, "@alice:weft.test", "one")]);
        f.set(gap(Some("t1")));
        assert!(matches!(
            &f.events()[..],
            [ListEvent::Update(0, Tile::Gap(_), Some(UpdateParams::Field("gap")))]
        ));

        f.set(gap(None));
        assert!(matches!(&f.events()[..], [ListEvent::Remove(0, Tile::Gap(_))]));
        assert_eq!(f.tiles.len(), 1);
        f.assert_links_consistent();
    }

    #[test]
    fn test_sender_change_updates_next_continuation() {
        let f = fixture(vec![
            message(1, "@alice:weft.test", "one"),
            message(2, "@alice:weft.test", "two"),
        ]);
        f.set(message(1, "@bob:weft.test", "one"));
        let events = f.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ListEvent::Update(0, _, None)));
        assert!(matches!(
            &events[1],
            ListEvent::Update(1, tile, Some(UpdateParams::Field("is_continuation"))) if !is_continuation(tile)
        ));
    }

    #[test]
    fn test_sender_change_recomputes_own_continuation() {
        let f = fixture(vec![
            message(1, "@alice:weft.test", "one"),
            message(2, "@alice:weft.test", "two"),
        ]);
        assert!(is_continuation(&f.tiles.get(1).unwrap()));
        f.set(message(2, "@bob:weft.test", "two"));
        assert!(matches!(&f.events()[..], [ListEvent::Update(1, tile, None)] if !is_continuation(tile)));
    }

    #[test]
    fn test_removing_an_entry_relinks_neighbours() {
        let f = fixture(vec![
            message(1, "@alice:weft.test", "one"),
            message(2, "@bob:weft.test", "two"),
            message(3, "@alice:weft.test", "three"),
        ]);
        let mut feed = feed(&f);
        feed.on_remove(1, &message(2, "@bob:weft.test", "two"));
        let events = f.events();
        assert!(matches!(events[0], ListEvent::Remove(1, _)));
        assert!(matches!(
            &events[1],
            ListEvent::Update(1, tile, Some(UpdateParams::Field("is_continuation"))) if is_continuation(tile)
        ));
        assert_eq!(f.tiles.len(), 2);
        f.assert_links_consistent();
    }

    #[test]
    fn test_removing_from_a_run_shrinks_it() {
        let f = fixture(vec![
            member(1, "@alice:weft.test", "join"),
            member(2, "@bob:weft.test", "join"),
        ]);
        let mut feed = feed(&f);
        feed.on_remove(0, &member(1, "@alice:weft.test", "join"));
        assert!(matches!(&f.events()[..], [ListEvent::Update(0, Tile::Membership(t), None)] if t.len() == 1));
        feed.on_remove(0, &member(2, "@bob:weft.test", "join"));
        assert!(matches!(&f.events()[..], [ListEvent::Remove(0, _)]));
        assert_eq!(f.tiles.len(), 0);
    }

    #[test]
    fn test_reset_rebuilds() {
        let f = fixture(vec![message(1, "@alice:weft.test", "one")]);
        f.entries
            .borrow_mut()
            .replace_all(vec![message(5, "@bob:weft.test", "five"), gap(Some("t"))]);
        let events = f.events();
        assert!(matches!(&events[..], [ListEvent::Reset(tiles)] if tiles.len() == 2));
        assert_eq!(f.lines()[0], "[gap] older history not loaded");
    }

    #[test]
    fn test_last_unsubscribe_detaches() {
        let f = fixture(vec![message(1, "@alice:weft.test", "one")]);
        assert!(f.tiles.unsubscribe(f.subscription));
        assert!(!f.tiles.unsubscribe(f.subscription));
        assert!(!f.tiles.is_active());
        assert_eq!(f.tiles.len(), 0);

        f.set(message(2, "@alice:weft.test", "two"));
        assert!(f.events().is_empty());

        let again = ListRecorder::<Tile>::shared();
        f.tiles.subscribe(again);
        assert_eq!(f.tiles.len(), 2);
    }
}
