//! The search index contract.
//!
//! The ingestion pipeline only ever adds books; deletion, lookup and querying
//! are there for the admin and browsing surfaces. [`MemoryIndex`] is a
//! complete, if naive, implementation for single-process use and tests.

pub mod error;
mod memory;

pub use crate::memory::MemoryIndex;
use crate::error::Result;
use async_trait::async_trait;
use booksing_extract::models::BookRecord;
use std::sync::Arc;

pub type IndexHandle = Arc<dyn SearchIndex + Send + Sync>;

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub books: Vec<BookRecord>,
    /// Total number of matches, ignoring `limit` and `offset`.
    pub total: usize,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add (or replace, keyed by content hash) a batch of books.
    ///
    /// A failed call may have indexed none, some or all of the batch; callers
    /// retry the whole batch, so implementations must tolerate re-adds.
    async fn add_books(&self, books: &[BookRecord]) -> Result<()>;

    /// Remove a book. Removing an unknown hash is not an error.
    async fn delete_book(&self, hash: &str) -> Result<()>;

    async fn get_book_by_hash(&self, hash: &str) -> Result<Option<BookRecord>>;

    /// Free-text query over titles and authors. An empty query matches every
    /// book, newest first.
    async fn query(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult>;
}
