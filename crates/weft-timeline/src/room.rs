//! A room: its summary, its live sync writer, and at most one open timeline.
//!
//! Sync is applied in two phases. [`Room::persist_sync`] writes to storage
//! and returns a [`SyncChanges`] describing what became visible; nothing in
//! memory changes yet. [`Room::emit_sync`] then applies that to the summary,
//! notifies subscribers and forwards new entries to the open timeline. A
//! failed write never leaves half-applied in-memory state behind.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::sync::broadcast;
use tracing::{debug, trace};
use weft_store::{RoomSummaryRecord, Storage};
use weft_types::{Entry, FragmentIdComparer, JoinedRoom, Membership, RoomId};

use crate::api::HistoryApi;
use crate::config::TimelineConfig;
use crate::error::RoomError;
use crate::persistence::SyncWriter;
use crate::summary::RoomSummary;
use crate::timeline::Timeline;

/// Notification sent to [`Room::subscribe_changes`] receivers.
#[derive(Clone, Debug, PartialEq)]
pub enum RoomChange {
    Summary(RoomSummary),
    /// Entries were appended from sync. Sent whether or not a timeline is open.
    LiveEntries(usize),
}

/// Outcome of the write phase of one sync, applied by [`Room::emit_sync`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncChanges {
    /// Set if the summary changed.
    pub summary: Option<RoomSummary>,
    pub entries: Vec<Entry>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.entries.is_empty()
    }
}

pub struct Room {
    id: RoomId,
    storage: Storage,
    comparer: Rc<FragmentIdComparer>,
    sync_writer: SyncWriter,
    history: Rc<dyn HistoryApi>,
    config: TimelineConfig,
    summary: RefCell<RoomSummary>,
    timeline: RefCell<Weak<Timeline>>,
    changes: broadcast::Sender<RoomChange>,
}

impl Room {
    pub fn new(id: RoomId, storage: Storage, history: Rc<dyn HistoryApi>, config: TimelineConfig) -> Self {
        let comparer = Rc::new(FragmentIdComparer::new());
        let (changes, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            sync_writer: SyncWriter::new(id.clone(), storage.clone(), comparer.clone()),
            summary: RefCell::new(RoomSummary::new(id.clone())),
            id,
            storage,
            comparer,
            history,
            config,
            timeline: RefCell::new(Weak::new()),
            changes,
        }
    }

    /// Restore state from storage.
    pub async fn load(&self, summary: Option<RoomSummaryRecord>) -> Result<(), RoomError> {
        if let Some(record) = summary {
            *self.summary.borrow_mut() = RoomSummary::from_record(record);
        }
        self.sync_writer.load().await?;
        debug!(room_id = %self.id, "room loaded");
        Ok(())
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn name(&self) -> Option<String> {
        self.summary.borrow().name().map(str::to_string)
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary.borrow().clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<RoomChange> {
        self.changes.subscribe()
    }

    /// Write phase: persist the batch and report what it changed.
    pub async fn persist_sync(&self, room: &JoinedRoom, membership: Membership) -> Result<SyncChanges, RoomError> {
        let entries = self.sync_writer.write_sync(room).await?;
        let mut summary = self.summary.borrow().clone();
        let summary = if summary.apply_sync(room, membership) {
            self.storage.summaries.set(summary.record().clone()).await?;
            Some(summary)
        } else {
            None
        };
        Ok(SyncChanges { summary, entries })
    }

    /// Apply phase: update memory and notify.
    pub fn emit_sync(&self, changes: SyncChanges) {
        let SyncChanges { summary, entries } = changes;
        if let Some(summary) = summary {
            *self.summary.borrow_mut() = summary.clone();
            let _ = self.changes.send(RoomChange::Summary(summary));
        }
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        match self.open_timeline_handle() {
            Some(timeline) => timeline.append_live_entries(entries),
            None => trace!(room_id = %self.id, count, "no open timeline, dropping live entries"),
        }
        let _ = self.changes.send(RoomChange::LiveEntries(count));
    }

    /// Open this room's timeline and load its newest entries.
    ///
    /// Fails immediately with [`RoomError::TimelineAlreadyOpen`] while an
    /// earlier timeline is alive and not closed.
    pub async fn open_timeline(&self) -> Result<Rc<Timeline>, RoomError> {
        if self.open_timeline_handle().is_some() {
            return Err(RoomError::TimelineAlreadyOpen(self.id.clone()));
        }
        let timeline = Rc::new(Timeline::new(
            self.id.clone(),
            self.storage.clone(),
            self.comparer.clone(),
            self.history.clone(),
            self.config.clone(),
        ));
        // claim the slot before suspending so a concurrent open fails
        *self.timeline.borrow_mut() = Rc::downgrade(&timeline);
        timeline.load().await?;
        debug!(room_id = %self.id, entries = timeline.entries().borrow().len(), "timeline opened");
        Ok(timeline)
    }

    fn open_timeline_handle(&self) -> Option<Rc<Timeline>> {
        self.timeline.borrow().upgrade().filter(|t| !t.is_closed())
    }
}
