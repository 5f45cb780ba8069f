//! Read-only access to the karaoke library on disk.
//!
//! Everything in here is relative to a library root: listing files,
//! reading file heads and computing the [`Fingerprint`] used to recognise a
//! file after it has been moved or renamed.

pub mod backend;
pub mod error;
mod fingerprint;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::fingerprint::{DEFAULT_FINGERPRINT_BYTES, Fingerprint, Fingerprinter};
pub use crate::models::FileMeta;
pub use crate::path::validate as validate_path;
