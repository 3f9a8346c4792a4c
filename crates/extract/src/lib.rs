mod epub;
pub mod error;
pub mod models;
mod normalize;

use tracing::instrument;

use crate::error::Result;
use crate::models::Metadata;
pub use crate::normalize::UNKNOWN_AUTHOR;

/// Top-level entrypoint for reading [`Metadata`] out of raw EPUB bytes.
///
/// The whole archive is expected in memory; callers that care about blocking
/// the async runtime should run this on a blocking thread. Title and author are
/// normalised (collapsed whitespace, "Last, First" flipped, missing author
/// replaced with [`UNKNOWN_AUTHOR`]).
#[instrument(skip(epub), fields(epub_size = epub.as_ref().len()))]
pub fn extract(epub: impl AsRef<[u8]>) -> Result<Metadata> {
    epub::metadata(epub.as_ref())
}

/// Content identity of a book file: BLAKE3 over the raw bytes, lowercase hex.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    blake3::hash(bytes.as_ref()).to_hex().to_string()
}

/// Builds small EPUB archives in memory, for tests in this and other crates.
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    /// A minimal, valid EPUB with the given title and (optional) creator.
    pub fn epub(title: &str, author: Option<&str>) -> Vec<u8> {
        let creator = author.map(|a| format!("<dc:creator>{a}</dc:creator>")).unwrap_or_default();
        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>{creator}<dc:language>en</dc:language>
  </metadata>
</package>"#
        );
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in
            [("mimetype", "application/epub+zip"), ("META-INF/container.xml", container), ("content.opf", &opf)]
        {
            writer.start_file(name, SimpleFileOptions::default()).expect("zip entry");
            writer.write_all(content.as_bytes()).expect("zip write");
        }
        writer.finish().expect("zip finish").into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fixture() {
        let meta = extract(fixtures::epub("Dune", Some("Herbert, Frank"))).unwrap();
        assert_eq!(meta.title, "Dune");
        assert_eq!(meta.author, "Frank Herbert");
        assert_eq!(meta.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, content_hash(b"hello".to_vec()));
        assert_ne!(hash, content_hash(b"hello!"));
    }
}
