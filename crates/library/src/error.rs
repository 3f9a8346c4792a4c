//! Library Error Types
//!
//! Per-file failures never surface as errors from the pipeline; workers turn
//! them into a [`ParseOutcome`](crate::ParseOutcome). These kinds are what the
//! collaborator traits in [`gateway`](crate::gateway) raise, and what the
//! [`IndexerHandle`](crate::IndexerHandle) returns once the pipeline is gone.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The book directory could not be listed at all.
    #[display("book directory is unavailable")]
    Discovery,
    /// A file could not be read or is not a usable book.
    #[display("could not extract book metadata")]
    Extraction,
    /// The book database failed a request.
    #[display("book database request failed")]
    Storage,
    /// The search index failed a request.
    #[display("search index request failed")]
    Index,
    /// The pipeline has shut down and no longer accepts requests.
    #[display("indexer is not running")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Index)
    }
}
