//! Store backends.
//!
//! - [`MemoryStore`]: `BTreeMap`, for tests and ephemeral sessions
//! - [`SqliteStore`]: one SQLite table per store, order-preserving BLOB keys

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, open_connection, open_memory_connection};
