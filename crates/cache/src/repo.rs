//! Repository for book records and book-count history.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{BookCount, BookCountRow, BookRow};
use booksing_extract::models::BookRecord;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use std::path::Path;
use time::UtcDateTime;

/// Outcome of [`Repository::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The record was written.
    Inserted,
    /// A record with the same content hash was already stored; nothing was
    /// written.
    AlreadyExists,
}

/// Repository for managing books in the database.
///
/// Each book is identified by the BLAKE3 hash of its file. The same path may
/// appear on more than one record (a file replaced by a different edition),
/// but a hash never does.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Whether any book has been recorded at `path` (relative to the library
    /// root).
    pub async fn exists_by_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(include_str!("../queries/exists_by_path.sql"))
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(found != 0)
    }

    pub async fn exists_by_hash(&self, hash: impl AsRef<str>) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(include_str!("../queries/exists_by_hash.sql"))
            .bind(hash.as_ref())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(found != 0)
    }

    /// Insert a book, unless one with the same content hash already exists.
    ///
    /// The check and the write are a single statement, so two concurrent
    /// inserts of the same content can never both report
    /// [`Inserted`](Insertion::Inserted).
    pub async fn insert(&self, book: &BookRecord) -> Result<Insertion> {
        let row = BookRow::try_from(book)?;
        let result = sqlx::query(include_str!("../queries/insert_book.sql"))
            .bind(row.hash)
            .bind(row.title)
            .bind(row.author)
            .bind(row.language)
            .bind(row.description)
            .bind(row.path)
            .bind(row.size)
            .bind(row.alternates)
            .bind(row.added_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(match result.rows_affected() {
            0 => Insertion::AlreadyExists,
            _ => Insertion::Inserted,
        })
    }

    pub async fn get_by_hash(&self, hash: impl AsRef<str>) -> Result<Option<BookRecord>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_by_hash.sql"))
            .bind(hash.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(BookRecord::try_from).transpose()
    }

    /// Remove a book record. The file itself is left alone.
    ///
    /// Returns `false` if no book had that hash.
    pub async fn delete_by_hash(&self, hash: impl AsRef<str>) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_by_hash.sql"))
            .bind(hash.as_ref())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recently added books first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<BookRecord>> {
        let limit = i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))?;
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_recent.sql"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BookRecord::try_from).collect()
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub async fn book_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_books.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))?)
    }

    /// Record a book-count snapshot taken now.
    pub async fn update_book_count(&self, total: u64) -> Result<()> {
        self.record_book_count(total, UtcDateTime::now()).await
    }

    pub async fn record_book_count(&self, total: u64, counted_at: UtcDateTime) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_book_count.sql"))
            .bind(counted_at.unix_timestamp())
            .bind(i64::try_from(total).or_raise(|| ErrorKind::InvalidData("total"))?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Book-count snapshots taken between `since` and `until` (inclusive),
    /// oldest first.
    pub async fn book_count_history(&self, since: UtcDateTime, until: UtcDateTime) -> Result<Vec<BookCount>> {
        let rows: Vec<BookCountRow> = sqlx::query_as(include_str!("../queries/book_count_history.sql"))
            .bind(since.unix_timestamp())
            .bind(until.unix_timestamp())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BookCount::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_extract::models::{Format, Metadata};
    use rstest::rstest;
    use time::Duration;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn book(hash: &str, path: &str) -> BookRecord {
        let metadata = Metadata {
            title: format!("Title {hash}"),
            author: "Frank Herbert".to_string(),
            language: Some("en".to_string()),
            description: Some("Spice.".to_string()),
            identifier: None,
        };
        BookRecord::new(hash, path, 1024, metadata)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repo().await;
        let dune = book("aaa", "scifi/dune.epub").with_alternates([Format::Mobi]);
        assert_eq!(repo.insert(&dune).await.unwrap(), Insertion::Inserted);
        let stored = repo.get_by_hash("aaa").await.unwrap().unwrap();
        assert_eq!(stored.title, dune.title);
        assert_eq!(stored.path, dune.path);
        assert!(stored.has_alternate(Format::Mobi));
        assert!(repo.get_by_hash("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_conflict_keeps_first() {
        let repo = repo().await;
        assert_eq!(repo.insert(&book("aaa", "first.epub")).await.unwrap(), Insertion::Inserted);
        assert_eq!(repo.insert(&book("aaa", "second.epub")).await.unwrap(), Insertion::AlreadyExists);
        let stored = repo.get_by_hash("aaa").await.unwrap().unwrap();
        assert_eq!(stored.path, Path::new("first.epub"));
        assert_eq!(repo.book_count().await.unwrap(), 1);
    }

    #[rstest]
    #[case("scifi/dune.epub", true)]
    #[case("scifi/other.epub", false)]
    #[case("dune.epub", false)]
    #[tokio::test]
    async fn test_exists_by_path(#[case] path: &str, #[case] expected: bool) {
        let repo = repo().await;
        repo.insert(&book("aaa", "scifi/dune.epub")).await.unwrap();
        assert_eq!(repo.exists_by_path(path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_exists_by_hash() {
        let repo = repo().await;
        assert!(!repo.exists_by_hash("aaa").await.unwrap());
        repo.insert(&book("aaa", "dune.epub")).await.unwrap();
        assert!(repo.exists_by_hash("aaa").await.unwrap());
    }

    #[tokio::test]
    async fn test_path_is_not_unique() {
        let repo = repo().await;
        repo.insert(&book("aaa", "dune.epub")).await.unwrap();
        assert_eq!(repo.insert(&book("bbb", "dune.epub")).await.unwrap(), Insertion::Inserted);
        assert_eq!(repo.book_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_hash() {
        let repo = repo().await;
        repo.insert(&book("aaa", "dune.epub")).await.unwrap();
        assert!(repo.delete_by_hash("aaa").await.unwrap());
        assert!(!repo.delete_by_hash("aaa").await.unwrap());
        assert_eq!(repo.book_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_recent() {
        let repo = repo().await;
        let now = UtcDateTime::now();
        for (i, hash) in ["aaa", "bbb", "ccc"].into_iter().enumerate() {
            let mut b = book(hash, &format!("{hash}.epub"));
            b.added_at = now + Duration::minutes(i as i64);
            repo.insert(&b).await.unwrap();
        }
        let recent = repo.list_recent(2).await.unwrap();
        let hashes: Vec<_> = recent.iter().map(|b| b.hash.as_str()).collect();
        assert_eq!(hashes, vec!["ccc", "bbb"]);
    }

    #[tokio::test]
    async fn test_book_count_history() {
        let repo = repo().await;
        let now = UtcDateTime::now();
        repo.record_book_count(1, now - Duration::days(10)).await.unwrap();
        repo.record_book_count(5, now - Duration::days(2)).await.unwrap();
        repo.record_book_count(7, now - Duration::days(1)).await.unwrap();
        let history = repo.book_count_history(now - Duration::days(3), now).await.unwrap();
        let totals: Vec<_> = history.iter().map(|c| c.total).collect();
        assert_eq!(totals, vec![5, 7]);

        repo.update_book_count(9).await.unwrap();
        let history = repo.book_count_history(now - Duration::days(30), now + Duration::minutes(1)).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.last().unwrap().total, 9);
    }
}
