//! SQLite record store for the songbook library index.
//!
//! The database is the durable half of the system: the library synchronizer
//! writes what it found on disk, the enrichment worker drains the queue of
//! entries that still need metadata, and both keep their bookkeeping
//! (counters, flags, last sync) in the same file so a restart is just a read.
//!
//! # Architecture
//! - **Entries**: one row per song, keyed by id, looked up by live path or by
//!   [fingerprint](songbook_storage::Fingerprint). Hidden instead of deleted.
//! - **Queue**: not a separate table, just the entries flagged `queued`,
//!   drained by priority then by age.
//! - **Worker state**: a small key/value table.
//!
//! The connection pool can be swapped out from under the repositories by a
//! [restore](Database::restore_from), so every repository asks the
//! [`Database`] for the current pool on each call.

mod db;
pub mod entry;
pub mod error;
mod maintenance;
mod models;
mod queue;
mod repo;
mod state;

pub use crate::db::Database;
pub use crate::entry::{EntryId, Format, LibraryEntry, Metadata, NewEntry, Status};
pub use crate::queue::{Applied, Outcome, Queue};
pub use crate::repo::{Change, Repository};
pub use crate::state::{StateRepository, WorkerState};
