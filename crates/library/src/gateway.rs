//! Collaborator contracts consumed by the pipeline.
//!
//! Workers and the scheduler only ever talk to the book database through
//! [`BookStore`] and to book files through [`MetadataExtractor`] (plus a
//! [`BackendHandle`] for deletes), so tests can swap in failing or slow
//! versions of either.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use booksing_cache::Repository;
use booksing_extract::error::ErrorKind as ExtractErrorKind;
use booksing_extract::models::{BookRecord, Format};
use booksing_storage::BackendHandle;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

pub use booksing_cache::Insertion;

pub type StoreHandle = Arc<dyn BookStore + Send + Sync>;
pub type ExtractorHandle = Arc<dyn MetadataExtractor + Send + Sync>;

/// Deduplication and persistence of book records.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Whether a book has been recorded at `path` (relative to the library
    /// root).
    async fn exists_by_path(&self, path: &Path) -> Result<bool>;

    async fn exists_by_hash(&self, hash: &str) -> Result<bool>;

    /// Store a record unless its content hash is already known. The check and
    /// the write must be atomic.
    async fn insert(&self, book: &BookRecord) -> Result<Insertion>;

    async fn book_count(&self) -> Result<u64>;

    /// Append a book-count snapshot.
    async fn update_book_count(&self, total: u64) -> Result<()>;
}

#[async_trait]
impl BookStore for Repository {
    async fn exists_by_path(&self, path: &Path) -> Result<bool> {
        Repository::exists_by_path(self, path).await.or_raise(|| ErrorKind::Storage)
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        Repository::exists_by_hash(self, hash).await.or_raise(|| ErrorKind::Storage)
    }

    async fn insert(&self, book: &BookRecord) -> Result<Insertion> {
        Repository::insert(self, book).await.or_raise(|| ErrorKind::Storage)
    }

    async fn book_count(&self) -> Result<u64> {
        Repository::book_count(self).await.or_raise(|| ErrorKind::Storage)
    }

    async fn update_book_count(&self, total: u64) -> Result<()> {
        Repository::update_book_count(self, total).await.or_raise(|| ErrorKind::Storage)
    }
}

/// Turns a book file into a [`BookRecord`].
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Any failure means the file is not a usable book.
    async fn extract(&self, path: &Path) -> Result<BookRecord>;
}

/// Reads EPUB files from storage and parses them off the async runtime.
///
/// The backend should not be extension-filtered: the extractor looks for
/// alternate formats (`dune.mobi` next to `dune.epub`) through it.
pub struct EpubExtractor {
    backend: BackendHandle,
}
impl EpubExtractor {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    async fn alternates(&self, path: &Path) -> Vec<Format> {
        let mut found = Vec::new();
        for format in Format::ALTERNATES {
            let sibling = format.sibling_of(path);
            match self.backend.exists(&sibling).await {
                Ok(true) => found.push(format),
                Ok(false) => {},
                Err(err) => tracing::debug!(path = %sibling.display(), error = ?err, "could not probe alternate format"),
            }
        }
        found
    }
}

#[async_trait]
impl MetadataExtractor for EpubExtractor {
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn extract(&self, path: &Path) -> Result<BookRecord> {
        let bytes = self
            .backend
            .read(path)
            .await
            .or_raise(|| ExtractErrorKind::Unreadable)
            .or_raise(|| ErrorKind::Extraction)?;
        let size = bytes.len() as u64;
        let (hash, metadata) = tokio::task::spawn_blocking(move || {
            let hash = booksing_extract::content_hash(&bytes);
            booksing_extract::extract(&bytes).map(|metadata| (hash, metadata))
        })
        .await
        .or_raise(|| ErrorKind::Extraction)?
        .or_raise(|| ErrorKind::Extraction)?;
        let alternates = self.alternates(path).await;
        Ok(BookRecord::new(hash, path, size, metadata).with_alternates(alternates))
    }
}
