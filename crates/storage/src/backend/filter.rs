//! Extension-filtered storage backend decorator.
//!
//! Wraps another backend and restricts all operations to files whose name
//! ends in one of a configured set of extensions.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{BackendHandle, StorageBackend, error::Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;

/// Extension-filtered storage backend.
///
/// Patterns are accepted glob-style (`"*.epub"`), dotted (`".epub"`) or bare
/// (`"epub"`), and are matched case-insensitively against the end of the file
/// name, so compound extensions such as `"fb2.zip"` work too. Paths that don't
/// match return [`FilteredPath`](ErrorKind::FilteredPath) and are left out of
/// listings. Listing errors always pass through.
///
/// ```
/// use booksing_storage::backend::{ExtensionFilterBackend, LocalBackend};
/// use std::sync::Arc;
///
/// # fn example() -> booksing_storage::error::Result<()> {
/// let local = Arc::new(LocalBackend::new("books", "/srv/books")?);
/// let books = ExtensionFilterBackend::new(local, ["*.epub"]);
/// assert!(books.matches("scifi/Dune.EPUB"));
/// assert!(!books.matches("scifi/Dune.mobi"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ExtensionFilterBackend {
    inner: BackendHandle,
    /// Lowercase suffixes including the leading dot, e.g. `".epub"`
    suffixes: Vec<String>,
}
impl ExtensionFilterBackend {
    pub fn new(inner: BackendHandle, patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut suffixes: Vec<String> = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().trim_start_matches('*').trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .collect();
        suffixes.sort();
        suffixes.dedup();
        Self { inner, suffixes }
    }

    /// Whether `path` passes the filter.
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        let Some(name) = path.as_ref().file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        // A bare ".epub" is a hidden file, not a book.
        self.suffixes.iter().any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
    }

    fn check(&self, path: &Path) -> Result<()> {
        if !self.matches(path) {
            exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ExtensionFilterBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(self.inner.list_stream(prefix).filter(|item| {
            std::future::ready(match item {
                Ok(info) => self.matches(&info.path),
                Err(_) => true,
            })
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.check(path)?;
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.check(path)?;
        self.inner.read(path).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.check(path)?;
        self.inner.delete(path).await
    }
}
