use booksing_extract::models::BookRecord;
use derive_more::Display;
use std::path::PathBuf;
use std::time::Duration;

/// How the pipeline classified one discovered file.
///
/// Every dispatched path ends up with exactly one of these. Counters and
/// metrics are derived from them and nothing else.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseOutcome {
    /// A book was already recorded at this path.
    #[display("unchanged")]
    Unchanged,
    /// A new book was stored.
    #[display("added")]
    Added,
    /// The content is already stored under another path.
    #[display("duplicate")]
    Duplicate,
    /// The file is not a readable book.
    #[display("invalid")]
    Invalid,
    /// The book database failed; the file is left alone and retried next scan.
    #[display("storage_error")]
    StorageError,
}
impl ParseOutcome {
    pub const ALL: [Self; 5] = [Self::Unchanged, Self::Added, Self::Duplicate, Self::Invalid, Self::StorageError];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Unchanged => 0,
            Self::Added => 1,
            Self::Duplicate => 2,
            Self::Invalid => 3,
            Self::StorageError => 4,
        }
    }
}

/// The result of processing one path.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Relative to the library root.
    pub path: PathBuf,
    pub outcome: ParseOutcome,
    pub elapsed: Duration,
    /// The stored record; only present for [`ParseOutcome::Added`].
    pub book: Option<Box<BookRecord>>,
}
impl ParseResult {
    pub(crate) fn new(path: PathBuf, outcome: ParseOutcome, elapsed: Duration) -> Self {
        Self { path, outcome, elapsed, book: None }
    }

    pub(crate) fn added(path: PathBuf, book: BookRecord, elapsed: Duration) -> Self {
        Self {
            path,
            outcome: ParseOutcome::Added,
            elapsed,
            book: Some(Box::new(book)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_distinct() {
        let mut seen = [false; ParseOutcome::ALL.len()];
        for outcome in ParseOutcome::ALL {
            assert!(!seen[outcome.index()], "{outcome} shares an index");
            seen[outcome.index()] = true;
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ParseOutcome::StorageError.to_string(), "storage_error");
        assert_eq!(ParseOutcome::Added.to_string(), "added");
    }
}
