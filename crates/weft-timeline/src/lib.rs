//! Room timelines for weft.
//!
//! Ties storage, sync and history together into what a client shows: a
//! [`Session`] of [`Room`]s, each of which can open one [`Timeline`] whose
//! sorted entry list feeds a [`TilesCollection`].
//!
//! # Key Types
//!
//! |----------------------|-------------------------------------------------------|
//! | Type                 | Purpose                                               |
//! |----------------------|-------------------------------------------------------|
//! | [`Session`]          | Observable map of rooms; applies whole sync batches   |
//! | [`Room`]             | Summary, sync writer, single open timeline            |
//! | [`Timeline`]         | Sorted entries; load, live append, gap fill           |
//! | [`TilesCollection`]  | Derived tile list with minimal deltas                 |
//! | [`HistoryApi`]       | Seam for paginated history requests                   |
//! | [`WeftConfig`]       | RON configuration                                     |
//! |----------------------|-------------------------------------------------------|
//!
//! Everything is single-threaded. Run it on a current-thread runtime inside
//! a `tokio::task::LocalSet`.

pub mod api;
pub mod config;
pub mod error;
pub mod persistence;
pub mod room;
pub mod session;
pub mod summary;
pub mod tiles;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use api::{ApiError, HistoryApi, NoHistory};
pub use config::{ConfigError, TimelineConfig, WeftConfig};
pub use error::{RoomError, TimelineError, TimelineResult};
pub use room::{Room, RoomChange, SyncChanges};
pub use session::{Session, SessionChanges};
pub use summary::RoomSummary;
pub use tiles::{Tile, TileBehavior, TileCreator, TileOptions, TileShape, TileView, TilesCollection};
pub use timeline::Timeline;
