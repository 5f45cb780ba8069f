//! Storage backend trait and implementations.
//!
//! The synchronizer only ever *reads* the library, so the trait is a
//! read-side view of a directory tree: walk it, stat a file, read a file's
//! head. Moving and deleting media is something users do behind our back.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileMeta;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub type FileMetaStream<'a> = Pin<Box<dyn Stream<Item = Result<FileMeta>> + Send + 'a>>;

/// Read-only interface to a library root.
///
/// # Path Handling
/// All paths are relative to the library root and are validated using
/// [`validate_path`](crate::validate_path) before use. Implementations must
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use songbook_storage::{backend::StorageBackend, error::Result};
///
/// async fn size_of_song(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("Queen/Bohemian Rhapsody.mp4");
///     Ok(backend.stat(path).await?.size)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Confirm the library root is present and listable.
    ///
    /// Returns [`RootUnavailable`](crate::error::ErrorKind::RootUnavailable)
    /// otherwise. An unmounted drive looks exactly like an empty library to a
    /// walk, so callers that act on *missing* files must probe first.
    async fn probe(&self) -> Result<()>;

    /// Stream metadata of every regular file below the root.
    ///
    /// Errors are yielded in-line and do **not** end the stream: a directory
    /// that can't be listed yields one
    /// [`Unlistable`](crate::error::ErrorKind::Unlistable) item and the walk
    /// carries on with its siblings.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use songbook_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream();
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(meta) => println!("{}: {} bytes", meta.path.display(), meta.size),
    ///         Err(e) => eprintln!("skipping: {}", *e),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream(&self) -> FileMetaStream<'_>;

    /// Read only the first N bytes.
    ///
    /// If the file is smaller than `bytes`, returns the entire file. Returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if the file does not
    /// exist.
    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>>;

    /// Get file metadata without reading contents.
    async fn stat(&self, path: &Path) -> Result<FileMeta>;
}
