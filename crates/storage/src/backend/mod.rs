//! Storage backend trait and implementations.
//!
//! [`StorageBackend`] is the only way the rest of the workspace touches book
//! files. [`LocalBackend`] talks to a directory on disk;
//! [`ExtensionFilterBackend`] decorates any backend so that only book files
//! are visible.

mod filter;
mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::filter::ExtensionFilterBackend;
pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use booksing_storage::{backend::StorageBackend, error::Result};
///
/// async fn remove_if_present(backend: &dyn StorageBackend, path: &Path) -> Result<bool> {
///     if !backend.exists(path).await? {
///         return Ok(false);
///     }
///     backend.delete(path).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Stream file metadata matching an optional prefix.
    ///
    /// Results are yielded lazily as the backend walks its contents. An error
    /// item does not end the stream: an unreadable subdirectory is reported
    /// and the walk carries on with its siblings. The exception is
    /// [`RootUnavailable`](crate::error::ErrorKind::RootUnavailable), which is
    /// always the only item of the stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use booksing_storage::backend::StorageBackend;
    /// # async fn example(backend: &dyn StorageBackend) {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(err) => eprintln!("skipping: {err}"),
    ///     }
    /// }
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
