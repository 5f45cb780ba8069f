//! Cheap content identity for library files.
//!
//! Media files are big, and reading every byte of every file on every scan
//! isn't an option. A fingerprint is a BLAKE3 hash of the file size followed
//! by the first few kilobytes of content. Two files only share a fingerprint
//! if they're the same length *and* start with the same bytes, which for
//! encoded audio/video is as good as identical. Container headers that look
//! alike between different songs are separated by the size.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use std::path::Path;

/// How much of the file head goes into a fingerprint unless configured otherwise.
pub const DEFAULT_FINGERPRINT_BYTES: usize = 16 * 1024;

/// Hex-encoded content identity of a library file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct Fingerprint(String);
impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl Fingerprint {
    /// Wrap an already computed fingerprint (for example one read back from
    /// the database). No validation is performed.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compute the fingerprint of a file's size and (already read) head.
    pub fn compute(size: u64, head: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(size.to_string().as_bytes());
        // Separator so that size "12" + head "3..." can't equal size "123".
        hasher.update(&[0]);
        hasher.update(head);
        Self(hasher.finalize().to_hex().to_string())
    }
}

/// Computes [`Fingerprint`]s for files in a [`StorageBackend`].
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    head_bytes: usize,
}
impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_BYTES)
    }
}
impl Fingerprinter {
    pub fn new(head_bytes: usize) -> Self {
        Self { head_bytes }
    }

    pub fn head_bytes(&self) -> usize {
        self.head_bytes
    }

    /// Fingerprint the file at `path` (relative to the backend root).
    ///
    /// Any failure to stat or read the file is reported as
    /// [`Unreadable`](ErrorKind::Unreadable); the underlying cause is kept in
    /// the error tree. Nothing is written.
    pub async fn fingerprint(&self, backend: &dyn StorageBackend, path: &Path) -> Result<Fingerprint> {
        let unreadable = || ErrorKind::Unreadable(path.to_path_buf());
        let meta = backend.stat(path).await.or_raise(unreadable)?;
        let head = backend.read_head(path, self.head_bytes).await.or_raise(unreadable)?;
        Ok(Fingerprint::compute(meta.size, &head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;

    #[test]
    fn test_size_is_part_of_identity() {
        // Same head, different total size: different fingerprints.
        let head = b"ID3\x04\x00\x00\x00\x00\x00\x00";
        assert_ne!(Fingerprint::compute(1_000, head), Fingerprint::compute(2_000, head));
        assert_eq!(Fingerprint::compute(1_000, head), Fingerprint::compute(1_000, head));
    }

    #[test]
    fn test_size_and_head_do_not_bleed_together() {
        assert_ne!(Fingerprint::compute(12, b"3abc"), Fingerprint::compute(123, b"abc"));
    }

    #[tokio::test]
    async fn test_stable_until_modified() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let fingerprinter = Fingerprinter::default();
        let path = Path::new("song.mp4");
        std::fs::write(temp_dir.path().join(path), b"first take").unwrap();
        let first = fingerprinter.fingerprint(&backend, path).await.unwrap();
        let again = fingerprinter.fingerprint(&backend, path).await.unwrap();
        assert_eq!(first, again);
        std::fs::write(temp_dir.path().join(path), b"second take").unwrap();
        let changed = fingerprinter.fingerprint(&backend, path).await.unwrap();
        assert_ne!(first, changed);
    }

    #[tokio::test]
    async fn test_only_head_is_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let fingerprinter = Fingerprinter::new(4);
        std::fs::write(temp_dir.path().join("a.zip"), b"HEADtail-one").unwrap();
        std::fs::write(temp_dir.path().join("b.zip"), b"HEADtail-two").unwrap();
        // Same length and same first 4 bytes: indistinguishable with a 4 byte head.
        let a = fingerprinter.fingerprint(&backend, Path::new("a.zip")).await.unwrap();
        let b = fingerprinter.fingerprint(&backend, Path::new("b.zip")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Fingerprint::compute(12, b"HEAD"));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let err = Fingerprinter::default().fingerprint(&backend, Path::new("gone.mp3")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(p) if p == Path::new("gone.mp3")));
    }
}
