//! The timeline stores, opened together over one backend.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::info;
use weft_types::{EventKey, Fragment};

use crate::backends::{MemoryStore, SqliteStore, open_connection, open_memory_connection};
use crate::error::StorageResult;
use crate::room_summaries::{RoomSummaryRecord, RoomSummaryStore};
use crate::timeline_events::{EventIdStoreKey, EventStoreKey, TimelineEventRecord, TimelineEventStore};
use crate::timeline_fragments::{FragmentStoreKey, TimelineFragmentStore};

const EVENTS_TABLE: &str = "timeline_events";
const EVENT_IDS_TABLE: &str = "timeline_event_ids";
const FRAGMENTS_TABLE: &str = "timeline_fragments";
const SUMMARIES_TABLE: &str = "room_summaries";

/// Storage section of the weft config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Rows fetched per SQLite cursor page.
    pub cursor_batch: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            cursor_batch: 64,
        }
    }
}

impl StorageConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_cursor_batch(mut self, cursor_batch: usize) -> Self {
        self.cursor_batch = cursor_batch.max(1);
        self
    }
}

#[derive(Clone)]
pub struct Storage {
    pub events: TimelineEventStore,
    pub fragments: TimelineFragmentStore,
    pub summaries: RoomSummaryStore,
}

impl Storage {
    /// Non-persistent storage backed by `BTreeMap`s.
    pub fn in_memory() -> Self {
        Self {
            events: TimelineEventStore::new(
                Rc::new(MemoryStore::<EventStoreKey, TimelineEventRecord>::new(EVENTS_TABLE)),
                Rc::new(MemoryStore::<EventIdStoreKey, EventKey>::new(EVENT_IDS_TABLE)),
            ),
            fragments: TimelineFragmentStore::new(Rc::new(MemoryStore::<FragmentStoreKey, Fragment>::new(FRAGMENTS_TABLE))),
            summaries: RoomSummaryStore::new(Rc::new(MemoryStore::<String, RoomSummaryRecord>::new(SUMMARIES_TABLE))),
        }
    }

    /// Open per `config`: SQLite at `config.path`, or in memory without one.
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        match &config.path {
            Some(path) => Self::open_sqlite(path, config),
            None => Ok(Self::in_memory()),
        }
    }

    /// Open (creating if needed) a SQLite database file.
    pub fn open_sqlite(path: impl AsRef<Path>, config: &StorageConfig) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = open_connection(path)?;
        let storage = Self::over_sqlite(conn, config.cursor_batch)?;
        info!(path = %path.display(), "storage opened");
        Ok(storage)
    }

    /// SQLite in memory (for testing the SQL paths).
    pub fn sqlite_in_memory() -> StorageResult<Self> {
        Self::over_sqlite(open_memory_connection()?, StorageConfig::default().cursor_batch)
    }

    fn over_sqlite(conn: Rc<rusqlite::Connection>, page_size: usize) -> StorageResult<Self> {
        let events = SqliteStore::<EventStoreKey, TimelineEventRecord>::new(conn.clone(), EVENTS_TABLE, page_size)?;
        let event_ids = SqliteStore::<EventIdStoreKey, EventKey>::new(conn.clone(), EVENT_IDS_TABLE, page_size)?;
        let fragments = SqliteStore::<FragmentStoreKey, Fragment>::new(conn.clone(), FRAGMENTS_TABLE, page_size)?;
        let summaries = SqliteStore::<String, RoomSummaryRecord>::new(conn, SUMMARIES_TABLE, page_size)?;
        Ok(Self {
            events: TimelineEventStore::new(Rc::new(events), Rc::new(event_ids)),
            fragments: TimelineFragmentStore::new(Rc::new(fragments)),
            summaries: RoomSummaryStore::new(Rc::new(summaries)),
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
