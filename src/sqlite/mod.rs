//! SQLite run store.
//!
//! [`schema`] describes one table per record family plus the derived
//! task_time table; [`writer`] commits decoded batches into them.
pub mod schema;
pub mod writer;

pub use schema::{Table, WritePolicy, SCHEMA_VERSION};
pub use writer::{StorageBatch, StorageSink};
