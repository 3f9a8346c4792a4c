//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Individual files
/// can be made unreadable, and the whole backend can be made unavailable, to
/// exercise error paths.
///
/// # Examples
///
/// ```
/// use booksing_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("scifi/dune.epub", b"spice")]);
/// assert!(backend.exists(Path::new("scifi/dune.epub")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    unreadable: HashSet<PathBuf>,
    available: bool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let map = files.into_iter().map(|(path, data)| (Self::validated(path), (now, data.into()))).collect();
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            unreadable: HashSet::new(),
            available: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Reads of `path` fail with an I/O error. The file still shows up in
    /// listings.
    pub fn with_unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unreadable.insert(Self::validated(path));
        self
    }

    /// Listing fails with [`RootUnavailable`](ErrorKind::RootUnavailable).
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn validated(path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        let Ok(validated) = validate_path(&path) else {
            panic!("MockBackend: invalid path {}", path.display());
        };
        validated
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

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            if !self.available {
                yield Err(exn::Exn::from(ErrorKind::RootUnavailable(PathBuf::from(&self.name))));
            } else {
                // Snapshot under the read lock so it isn't held across yields.
                let entries: Vec<FileInfo> = {
                    let guard = self.storage.read().await;
                    guard
                        .iter()
                        .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                        .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                        .collect()
                };
                for info in entries {
                    yield Ok(info);
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        if self.unreadable.contains(&path) {
            exn::bail!(ErrorKind::Io(std::io::Error::other("simulated read failure")));
        }
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
