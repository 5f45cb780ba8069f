//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A value couldn't be converted between its database and model form.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] i64),
    /// The integrity check failed. Not repaired automatically: reset the
    /// database or restore it from a snapshot.
    #[display("database is corrupt: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// A file offered for restore was rejected. The live database has not
    /// been touched.
    #[display("invalid snapshot: {_0}")]
    InvalidSnapshot(#[error(not(source))] String),
    /// Writing a snapshot file failed.
    #[display("snapshot failed")]
    Snapshot,
    /// The snapshot offered for restore couldn't be copied next to the live
    /// database. The live database has not been touched.
    #[display("could not stage snapshot for restore")]
    Staging,
    /// Swapping a validated snapshot into place failed part way through.
    #[display("restore failed while replacing the live database")]
    Swap,
    /// In-memory databases have no file to snapshot into or restore over.
    #[display("operation requires a file-backed database")]
    InMemory,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Snapshot | Self::Staging)
    }
}
