use crate::error::Result;
use crate::{SearchIndex, SearchResult};
use async_trait::async_trait;
use booksing_extract::models::BookRecord;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process search index.
///
/// Matching is a case-insensitive substring test of every query term against
/// the title and author; a book matches when all terms are found. Results are
/// ordered by title, then author.
#[derive(Default)]
pub struct MemoryIndex {
    books: RwLock<HashMap<String, BookRecord>>,
}
impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.books.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.books.read().await.is_empty()
    }
}

fn matches(book: &BookRecord, terms: &[String]) -> bool {
    let title = book.title.to_lowercase();
    let author = book.author.to_lowercase();
    terms.iter().all(|term| title.contains(term.as_str()) || author.contains(term.as_str()))
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn add_books(&self, books: &[BookRecord]) -> Result<()> {
        let mut guard = self.books.write().await;
        for book in books {
            guard.insert(book.hash.clone(), book.clone());
        }
        tracing::trace!(added = books.len(), total = guard.len(), "indexed books");
        Ok(())
    }

    async fn delete_book(&self, hash: &str) -> Result<()> {
        self.books.write().await.remove(hash);
        Ok(())
    }

    async fn get_book_by_hash(&self, hash: &str) -> Result<Option<BookRecord>> {
        Ok(self.books.read().await.get(hash).cloned())
    }

    async fn query(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let mut found: Vec<BookRecord> = {
            let guard = self.books.read().await;
            guard.values().filter(|book| matches(book, &terms)).cloned().collect()
        };
        if terms.is_empty() {
            found.sort_by_key(|book| (Reverse(book.added_at), book.hash.clone()));
        } else {
            found.sort_by_cached_key(|book| (book.title.to_lowercase(), book.author.to_lowercase(), book.hash.clone()));
        }
        let total = found.len();
        let books = found.into_iter().skip(offset).take(limit).collect();
        Ok(SearchResult { books, total })
    }
}
