//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// The storage root itself is missing or cannot be listed. Nothing under
    /// it can be trusted to be complete.
    #[display("storage root unavailable: {}", _0.display())]
    RootUnavailable(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Path rejected by an extension filter
    #[display("filtered path: {}", _0.display())]
    FilteredPath(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_) | Self::RootUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ErrorKind::RootUnavailable(PathBuf::from("/srv/books"));
        assert_eq!(err.to_string(), "storage root unavailable: /srv/books");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::RootUnavailable(PathBuf::from("/srv/books")).is_retryable());
        assert!(ErrorKind::Io(IoError::other("disk")).is_retryable());
        assert!(!ErrorKind::NotFound(PathBuf::from("a.epub")).is_retryable());
        assert!(!ErrorKind::FilteredPath(PathBuf::from("a.txt")).is_retryable());
    }
}
