//! Error types for the [`sync`](super) module.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a sync gave up. Problems with individual files never end up here:
/// they're logged and the file is skipped.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The library root is missing or can't be listed (an unmounted drive,
    /// a typo in the configuration). Nothing was written.
    #[display("library root could not be scanned")]
    ScanFailed,
    /// Reading or writing the [record store](songbook_cache::Repository)
    /// failed. Batches committed before the failure stay committed.
    #[display("record store error during sync")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ScanFailed | Self::Store)
    }
}
