//! Error types for the [`backup`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A backup error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file offered for restore was rejected; the live store was not
    /// touched. The reason is fit to show as is.
    #[display("invalid snapshot: {_0}")]
    InvalidSnapshot(#[error(not(source))] String),
    /// The integrity check found problems. Restore from a snapshot or start
    /// over; nothing is repaired automatically.
    #[display("library database is corrupt: {_0}")]
    Corrupt(#[error(not(source))] String),
    #[display("backup directory unusable: {}", _0.display())]
    Directory(#[error(not(source))] PathBuf),
    #[display("snapshot could not be written")]
    Snapshot,
    /// Restoring failed after validation. The store was reopened on
    /// whatever database file is present; the database as it was before the
    /// restore is in the carried snapshot, if one could be taken.
    #[display("restore failed{}", _0.as_ref().map(|p| format!(", previous database saved to {}", p.display())).unwrap_or_default())]
    Restore(#[error(not(source))] Option<PathBuf>),
    /// Only databases backed by a file can be restored.
    #[display("in-memory databases cannot be restored")]
    InMemory,
    #[display("record store error")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Snapshot | Self::Store)
    }
}
