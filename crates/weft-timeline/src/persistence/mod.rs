//! Storage-facing halves of the timeline: reading entries back, and
//! writing sync batches and history pages.

mod gap_writer;
mod reader;
mod sync_writer;

pub use gap_writer::GapWriter;
pub use reader::TimelineReader;
pub use sync_writer::SyncWriter;
