//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration file was asked for explicitly but isn't there.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("unsupported configuration file format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// A file or environment variable couldn't be parsed into the expected
    /// shape. The underlying error names the offending key.
    #[display("configuration could not be read")]
    Parse,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A setting the requested command can't do without.
    #[display("missing configuration value: {_0}")]
    Missing(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Configuration errors are fixed by editing configuration, not by
    /// trying again.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
