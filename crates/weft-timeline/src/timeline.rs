//! One room's open timeline: the sorted entry list and the three ways it
//! grows.
//!
//! | Source | Call |
//! |--------|------|
//! | Storage, newest first | [`Timeline::load`], [`Timeline::load_at_top`] |
//! | Live sync | [`Timeline::append_live_entries`] (driven by the room) |
//! | History API | [`Timeline::fill_gap`], [`Timeline::fill_gap_default`] |
//!
//! Merges land in the order their futures complete. Don't run two fills
//! over the same gap concurrently.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, warn};
use weft_observable::SortedArray;
use weft_store::Storage;
use weft_types::{Direction, Entry, FragmentIdComparer, MessagesRequest, RoomId};

use crate::api::HistoryApi;
use crate::config::TimelineConfig;
use crate::error::{TimelineError, TimelineResult};
use crate::persistence::{GapWriter, TimelineReader};
use crate::tiles::{TileCreator, TileOptions, TilesCollection};

pub struct Timeline {
    room_id: RoomId,
    comparer: Rc<FragmentIdComparer>,
    history: Rc<dyn HistoryApi>,
    config: TimelineConfig,
    reader: TimelineReader,
    gap_writer: GapWriter,
    entries: Rc<RefCell<SortedArray<Entry>>>,
    closed: Cell<bool>,
}

impl Timeline {
    pub fn new(
        room_id: RoomId,
        storage: Storage,
        comparer: Rc<FragmentIdComparer>,
        history: Rc<dyn HistoryApi>,
        config: TimelineConfig,
    ) -> Self {
        let cmp = comparer.clone();
        let entries = SortedArray::new(move |a: &Entry, b: &Entry| cmp.compare_keys(&a.sort_key, &b.sort_key));
        Self {
            reader: TimelineReader::new(room_id.clone(), storage.clone(), comparer.clone()),
            gap_writer: GapWriter::new(room_id.clone(), storage, comparer.clone()),
            room_id,
            comparer,
            history,
            config,
            entries: Rc::new(RefCell::new(entries)),
            closed: Cell::new(false),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Seed the entry list with the newest `initial_load` events.
    pub async fn load(&self) -> TimelineResult<()> {
        let entries = self.reader.read_from_end(self.config.initial_load).await?;
        debug!(room_id = %self.room_id, entries = entries.len(), "timeline loaded");
        self.merge(entries);
        Ok(())
    }

    /// Merge entries the room just persisted from sync.
    pub fn append_live_entries(&self, entries: Vec<Entry>) {
        if self.closed.get() {
            debug!(room_id = %self.room_id, "dropping live entries for closed timeline");
            return;
        }
        self.merge(entries);
    }

    /// Fetch up to `amount` events behind the gap `entry` and merge them.
    ///
    /// Network and storage errors leave the entry list untouched. Returns the
    /// number of events added.
    pub async fn fill_gap(&self, entry: &Entry, amount: usize) -> TimelineResult<usize> {
        let Some(boundary) = entry.as_boundary() else {
            return Err(TimelineError::NotAGap(entry.sort_key.to_string()));
        };
        let Some(token) = boundary.token.clone() else {
            return Err(TimelineError::NotAGap(entry.sort_key.to_string()));
        };
        let request = MessagesRequest {
            from: token,
            dir: boundary.direction,
            limit: amount,
        };
        let response = self.history.messages(&self.room_id, request).await?;
        let written = self.gap_writer.write_fragment_fill(boundary, &response).await?;
        if self.closed.get() {
            // nothing cancels an in-flight fill; the result lands on a timeline nobody reads
            warn!(room_id = %self.room_id, "gap fill finished after timeline closed");
        }
        let added = count_events(&written);
        debug!(room_id = %self.room_id, added, direction = ?boundary.direction, "filled gap");
        self.merge(written);
        Ok(added)
    }

    /// [`fill_gap`](Self::fill_gap) with the configured `fill_amount`.
    pub async fn fill_gap_default(&self, entry: &Entry) -> TimelineResult<usize> {
        self.fill_gap(entry, self.config.fill_amount).await
    }

    /// Read up to `amount` stored events before the earliest loaded event.
    /// Returns the number of events added.
    pub async fn load_at_top(&self, amount: usize) -> TimelineResult<usize> {
        let first = self
            .entries
            .borrow()
            .find(|e| e.as_event().is_some())
            .map(|e| e.sort_key);
        let Some(key) = first else {
            return Ok(0);
        };
        let entries = self.reader.read_from(key, Direction::Backward, amount).await?;
        let added = count_events(&entries);
        self.merge(entries);
        Ok(added)
    }

    /// The sorted entry list. Subscribe to it for raw deltas.
    pub fn entries(&self) -> Rc<RefCell<SortedArray<Entry>>> {
        self.entries.clone()
    }

    pub fn entry_snapshot(&self) -> Vec<Entry> {
        self.entries.borrow().as_slice().to_vec()
    }

    /// A tile list over this timeline's entries. Inert until subscribed.
    pub fn tiles(&self, options: TileOptions) -> Rc<TilesCollection> {
        TilesCollection::new(self.entries.clone(), self.comparer.clone(), TileCreator::new(options))
    }

    /// Stop receiving live entries. The room may open a new timeline after this.
    pub fn close(&self) {
        if !self.closed.replace(true) {
            debug!(room_id = %self.room_id, "timeline closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn merge(&self, entries: Vec<Entry>) {
        self.entries.borrow_mut().set_many_sorted(entries);
    }
}

fn count_events(entries: &[Entry]) -> usize {
    entries.iter().filter(|e| e.as_event().is_some()).count()
}
