//! In-memory storage backend for testing.

use super::FileMetaStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileMeta;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    files: HashMap<PathBuf, (UtcDateTime, Vec<u8>)>,
    /// Files that list and stat fine but can't be opened.
    unreadable: HashSet<PathBuf>,
    /// Directories whose listing fails.
    unlistable: HashSet<PathBuf>,
    offline: bool,
}

/// In-memory storage backend for testing.
///
/// Besides holding files, it can simulate the failure modes a real library
/// produces: unreadable files, directories that can't be listed and a root
/// that has gone away entirely.
///
/// # Examples
///
/// ```
/// use songbook_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Queen/song.mp4", b"data")]);
/// assert_eq!(backend.stat(Path::new("Queen/song.mp4")).await.unwrap().size, 4);
/// backend.remove("Queen/song.mp4").await;
/// assert!(backend.stat(Path::new("Queen/song.mp4")).await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    state: RwLock<State>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let mut state = State::default();
        for (path, data) in files {
            state.files.insert(Self::checked(path), (now, data.into()));
        }
        Self { name: "mock".to_string(), state: RwLock::new(state) }
    }

    fn checked(path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        match validate_path(&path) {
            Ok(validated) => validated,
            Err(_) => panic!("MockBackend: invalid path {}", path.display()),
        }
    }

    /// Add or replace a file.
    pub async fn put(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let path = Self::checked(path);
        self.state.write().await.files.insert(path, (UtcDateTime::now(), data.into()));
    }

    pub async fn remove(&self, path: impl Into<PathBuf>) {
        let path = Self::checked(path);
        self.state.write().await.files.remove(&path);
    }

    /// Move a file, keeping its content and timestamp.
    pub async fn rename(&self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        let (from, to) = (Self::checked(from), Self::checked(to));
        let mut state = self.state.write().await;
        if let Some(file) = state.files.remove(&from) {
            state.files.insert(to, file);
        }
    }

    /// Make reads of a file fail while it still shows up in listings.
    pub async fn deny_reads(&self, path: impl Into<PathBuf>) {
        let path = Self::checked(path);
        self.state.write().await.unreadable.insert(path);
    }

    /// Make listing a directory (and everything below it) fail.
    pub async fn deny_listing(&self, dir: impl Into<PathBuf>) {
        let dir = Self::checked(dir);
        self.state.write().await.unlistable.insert(dir);
    }

    /// Simulate the whole library going away (unmounted drive).
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<()> {
        if self.state.read().await.offline {
            exn::bail!(ErrorKind::RootUnavailable(PathBuf::from("/mock")));
        }
        Ok(())
    }

    fn list_stream(&self) -> FileMetaStream<'_> {
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let (files, unlistable) = {
                let state = self.state.read().await;
                let mut files: Vec<FileMeta> = state
                    .files
                    .iter()
                    .map(|(path, (modified, data))| FileMeta::new(path, data.len() as u64, *modified))
                    .collect();
                files.sort_by(|a, b| a.path.cmp(&b.path));
                let mut unlistable: Vec<PathBuf> = state.unlistable.iter().cloned().collect();
                unlistable.sort();
                (files, unlistable)
            };
            for dir in &unlistable {
                yield Err(exn::Exn::from(ErrorKind::Unlistable(dir.clone())));
            }
            for file in files {
                if unlistable.iter().any(|dir| file.path.starts_with(dir)) {
                    continue;
                }
                yield Ok(file);
            }
        })
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let state = self.state.read().await;
        if state.unreadable.contains(&path) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        let (_modified, data) = state.files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(data[..bytes.min(data.len())].to_vec())
    }

    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let path = validate_path(path)?;
        let state = self.state.read().await;
        let (modified, data) = state.files.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileMeta::new(&path, data.len() as u64, *modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};

    #[tokio::test]
    async fn test_put_and_read() {
        let backend = MockBackend::default();
        backend.put("song.mp3", b"hello".to_vec()).await;
        assert_eq!(backend.read_head(Path::new("song.mp3"), 3).await.unwrap(), b"hel");
        assert_eq!(backend.stat(Path::new("song.mp3")).await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_denied_reads_still_list() {
        let backend = MockBackend::with_files([("a.mp4", b"aaa")]);
        backend.deny_reads("a.mp4").await;
        let listed: Vec<FileMeta> = backend.list_stream().try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        let err = backend.read_head(Path::new("a.mp4"), 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_unlistable_directory_hides_contents() {
        let backend = MockBackend::with_files([("Locked/a.mp4", b"a"), ("Open/b.mp4", b"b")]);
        backend.deny_listing("Locked").await;
        let items: Vec<_> = backend.list_stream().collect().await;
        assert_eq!(items.len(), 2);
        let err = items[0].as_ref().unwrap_err();
        assert!(matches!(&**err, ErrorKind::Unlistable(p) if p == Path::new("Locked")));
        assert_eq!(items[1].as_ref().unwrap().path, Path::new("Open/b.mp4"));
    }

    #[tokio::test]
    async fn test_offline() {
        let backend = MockBackend::default();
        backend.probe().await.unwrap();
        backend.set_offline(true).await;
        assert!(backend.probe().await.is_err());
    }
}
