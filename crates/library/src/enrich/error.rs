//! Error types for the [`enrich`](super) module.

use derive_more::{Display, Error};

/// An enrichment error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for enrichment operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The external service could not be reached or returned garbage. The
    /// scheduler spends an attempt and moves on.
    #[display("enrichment service unavailable")]
    Unavailable,
    /// The service answered, but knows nothing about the song.
    #[display("no match found by enrichment service")]
    NotFound,
    /// The record store could not be read or written.
    #[display("record store error during enrichment")]
    Store,
    #[display("enrichment worker is already running")]
    AlreadyRunning,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Store)
    }
}
