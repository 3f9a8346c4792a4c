//! Collaborators that fail or stall on demand.

use crate::error::{ErrorKind, Result};
use crate::gateway::{BookStore, ExtractorHandle, Insertion, MetadataExtractor};
use async_trait::async_trait;
use booksing_cache::Repository;
use booksing_extract::models::BookRecord;
use booksing_search::error::{ErrorKind as SearchErrorKind, Result as SearchResult};
use booksing_search::{MemoryIndex, SearchIndex, SearchResult as SearchPage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// A [`Repository`] whose calls can be made to fail or stall.
pub(crate) struct FlakyStore {
    inner: Repository,
    fail_inserts: AtomicBool,
    fail_lookups: AtomicBool,
    hide_hashes: AtomicBool,
    stall_inserts: AtomicBool,
    committed: CancellationToken,
    release: CancellationToken,
}
impl FlakyStore {
    pub fn new(inner: Repository) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
            hide_hashes: AtomicBool::new(false),
            stall_inserts: AtomicBool::new(false),
            committed: CancellationToken::new(),
            release: CancellationToken::new(),
        }
    }

    /// Inserts are written, then held until [`release`](Self::release).
    pub fn stall_inserts(&self) {
        self.stall_inserts.store(true, Ordering::SeqCst);
    }

    /// Resolves once a stalled insert has been written.
    pub async fn committed(&self) {
        self.committed.cancelled().await;
    }

    pub fn release(&self) {
        self.release.cancel();
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// `exists_by_hash` always answers `false`, as if another worker stored
    /// the same content right after the check.
    pub fn hide_hashes(&self, hide: bool) {
        self.hide_hashes.store(hide, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Storage);
        }
        Ok(())
    }
}

#[async_trait]
impl BookStore for FlakyStore {
    async fn exists_by_path(&self, path: &Path) -> Result<bool> {
        Self::check(&self.fail_lookups)?;
        BookStore::exists_by_path(&self.inner, path).await
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        Self::check(&self.fail_lookups)?;
        if self.hide_hashes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        BookStore::exists_by_hash(&self.inner, hash).await
    }

    async fn insert(&self, book: &BookRecord) -> Result<Insertion> {
        Self::check(&self.fail_inserts)?;
        let insertion = BookStore::insert(&self.inner, book).await?;
        if self.stall_inserts.load(Ordering::SeqCst) {
            self.committed.cancel();
            self.release.cancelled().await;
        }
        Ok(insertion)
    }

    async fn book_count(&self) -> Result<u64> {
        BookStore::book_count(&self.inner).await
    }

    async fn update_book_count(&self, total: u64) -> Result<()> {
        BookStore::update_book_count(&self.inner, total).await
    }
}

/// Holds every extraction until the gate is opened.
pub(crate) struct GatedExtractor {
    inner: ExtractorHandle,
    gate: CancellationToken,
}
impl GatedExtractor {
    pub fn new(inner: ExtractorHandle) -> Self {
        Self { inner, gate: CancellationToken::new() }
    }

    pub fn open(&self) {
        self.gate.cancel();
    }
}

#[async_trait]
impl MetadataExtractor for GatedExtractor {
    async fn extract(&self, path: &Path) -> Result<BookRecord> {
        self.gate.cancelled().await;
        self.inner.extract(path).await
    }
}

/// A [`MemoryIndex`] that rejects the first few `add_books` calls.
#[derive(Default)]
pub(crate) struct FlakyIndex {
    pub inner: MemoryIndex,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}
impl FlakyIndex {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SearchIndex for FlakyIndex {
    async fn add_books(&self, books: &[BookRecord]) -> SearchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            exn::bail!(SearchErrorKind::Unavailable);
        }
        self.inner.add_books(books).await
    }

    async fn delete_book(&self, hash: &str) -> SearchResult<()> {
        self.inner.delete_book(hash).await
    }

    async fn get_book_by_hash(&self, hash: &str) -> SearchResult<Option<BookRecord>> {
        self.inner.get_book_by_hash(hash).await
    }

    async fn query(&self, query: &str, limit: usize, offset: usize) -> SearchResult<SearchPage> {
        self.inner.query(query, limit, offset).await
    }
}
