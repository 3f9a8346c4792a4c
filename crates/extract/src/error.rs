//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Every variant means the same thing to the ingestion pipeline: the file is
/// not a usable book.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The book file could not be read from storage.
    #[display("book file could not be read")]
    Unreadable,
    /// The file is not a ZIP container (every EPUB is one).
    #[display("not a valid EPUB archive")]
    NotAnArchive,
    /// A file that every EPUB must contain is absent from the archive.
    #[display("missing archive entry: {_0}")]
    MissingEntry(#[error(not(source))] String),
    /// The container or package document is too broken to process.
    #[display("malformed package document: {_0}")]
    MalformedPackage(#[error(not(source))] &'static str),
    /// A required metadata field could not be found in the package document.
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Only the read can fail transiently; the archive is either a book
        // or it's not.
        matches!(self, Self::Unreadable)
    }
}
