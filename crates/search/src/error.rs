//! Search Index Error Types

use derive_more::{Display, Error};

/// A search index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for search index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The index could not be reached or refused the request.
    #[display("search index unavailable")]
    Unavailable,
    /// The index rejected the request itself (bad query, bad document).
    #[display("search index rejected request: {_0}")]
    Rejected(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}
