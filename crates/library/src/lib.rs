//! Keeping the songbook index in step with the library on disk.
//!
//! - [`sync`]: reconcile the record store with the files under the library
//!   root, telling moves apart from deletions by fingerprint.
//! - [`enrich`]: the rate-limited background worker that fills in metadata.
//! - [`backup`]: snapshots, restores and integrity checks.

pub mod backup;
mod classify;
pub mod enrich;
mod label;
pub mod sync;

pub use crate::backup::BackupManager;
pub use crate::classify::{Candidate, classify};
pub use crate::enrich::{EnrichmentClient, Scheduler, SchedulerOptions};
pub use crate::label::{BasicLabelParser, Label, LabelParser};
pub use crate::sync::{ReconciliationReport, SyncOptions, Synchronizer};
