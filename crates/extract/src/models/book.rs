use super::{Format, Metadata};
use std::collections::BTreeSet;
use std::path::PathBuf;
use time::UtcDateTime;

/// The canonical record of one ingested book.
///
/// The content `hash` is the identity: two files with identical bytes are the
/// same book, wherever they live. `path` is relative to the library root and is
/// deliberately not unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    /// BLAKE3 hash of the file bytes, lowercase hex (primary key)
    pub hash: String,
    pub title: String,
    pub author: String,
    pub language: Option<String>,
    pub description: Option<String>,
    /// Location of the source EPUB, relative to the library root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Other formats of the same book found next to the EPUB
    pub alternates: BTreeSet<Format>,
    pub added_at: UtcDateTime,
}
impl AsRef<BookRecord> for BookRecord {
    fn as_ref(&self) -> &BookRecord {
        self
    }
}
impl BookRecord {
    pub fn new(hash: impl Into<String>, path: impl Into<PathBuf>, size: u64, metadata: Metadata) -> Self {
        Self {
            hash: hash.into(),
            title: metadata.title,
            author: metadata.author,
            language: metadata.language,
            description: metadata.description,
            path: path.into(),
            size,
            alternates: BTreeSet::new(),
            added_at: UtcDateTime::now(),
        }
    }

    pub fn with_alternates(mut self, alternates: impl IntoIterator<Item = Format>) -> Self {
        self.alternates.extend(alternates);
        self
    }

    pub fn has_alternate(&self, format: Format) -> bool {
        self.alternates.contains(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata {
        Metadata {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            language: Some("en".to_string()),
            description: None,
            identifier: None,
        }
    }

    #[test]
    fn test_alternates() {
        let book = BookRecord::new("abc", "scifi/dune.epub", 42, metadata()).with_alternates([Format::Mobi]);
        assert!(book.has_alternate(Format::Mobi));
        assert!(!book.has_alternate(Format::Pdf));
        assert_eq!(book.title, "Dune");
        assert_eq!(book.path, PathBuf::from("scifi/dune.epub"));
    }
}
