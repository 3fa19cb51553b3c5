//! Ordered key-value storage for weft.
//!
//! Three layers, bottom up:
//!
//! - [`OrderedStore`] / [`StoreCursor`]: the backend contract. A store maps
//!   totally ordered keys to values and hands out cursors over a
//!   [`KeyRange`] in either direction. [`MemoryStore`] and [`SqliteStore`]
//!   implement it.
//! - [`QueryTarget`]: range queries written once against that contract:
//!   folds, bounded and predicate-bounded selects, directional find, and the
//!   merge-scan [`QueryTarget::find_existing_keys`].
//! - Typed timeline stores ([`TimelineEventStore`], [`TimelineFragmentStore`],
//!   [`RoomSummaryStore`]) bundled as [`Storage`].
//!
//! Everything here is single-threaded (`?Send` futures); a store handle is
//! shared by `Rc`.

pub mod backends;
mod error;
mod key;
mod ops;
mod query;
mod range;
mod room_summaries;
mod storage;
mod timeline_events;
mod timeline_fragments;

pub use backends::{MemoryStore, SqliteStore};
pub use error::{BackendError, StorageError, StorageResult, StoreOp};
pub use key::{KeyDecodeError, StoreKey};
pub use ops::{KeyCursor, OrderedStore, StoreCursor};
pub use query::QueryTarget;
pub use range::KeyRange;
pub use room_summaries::{RoomSummaryRecord, RoomSummaryStore};
pub use storage::{Storage, StorageConfig};
pub use timeline_events::{TimelineEventRecord, TimelineEventStore};
pub use timeline_fragments::TimelineFragmentStore;
