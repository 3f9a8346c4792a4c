use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A book file format the library knows how to recognise.
///
/// Only [`Epub`](Self::Epub) is ingested; the others are tracked as
/// alternate formats that happen to sit next to an ingested book (a
/// Kindle conversion with the same file stem, for example).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Epub,
    Mobi,
    Azw3,
    Pdf,
}
impl Format {
    /// Formats that may appear next to an ingested EPUB.
    pub const ALTERNATES: [Format; 3] = [Format::Mobi, Format::Azw3, Format::Pdf];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Pdf => "pdf",
        }
    }

    /// Detects the format from a file extension, case-insensitively.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(|ext| ext.parse().ok())
    }

    /// The path a file of this format would have if it shared a stem with `path`.
    ///
    /// ```rust
    /// use booksing_extract::models::Format;
    /// use std::path::Path;
    /// assert_eq!(Format::Mobi.sibling_of("shelf/dune.epub"), Path::new("shelf/dune.mobi"));
    /// ```
    pub fn sibling_of(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref().with_extension(self.extension())
    }
}

impl FromStr for Format {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epub" => Ok(Self::Epub),
            "mobi" => Ok(Self::Mobi),
            "azw3" => Ok(Self::Azw3),
            "pdf" => Ok(Self::Pdf),
            _ => Err(()),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("book.epub", Some(Format::Epub))]
    #[case("book.EPUB", Some(Format::Epub))]
    #[case("dir/book.mobi", Some(Format::Mobi))]
    #[case("book.azw3", Some(Format::Azw3))]
    #[case("book.pdf", Some(Format::Pdf))]
    #[case("book.txt", None)]
    #[case("book", None)]
    fn test_from_path(#[case] path: &str, #[case] expected: Option<Format>) {
        assert_eq!(Format::from_path(path), expected);
    }

    #[test]
    fn test_display_matches_extension() {
        for format in [Format::Epub, Format::Mobi, Format::Azw3, Format::Pdf] {
            assert_eq!(format.to_string().parse::<Format>(), Ok(format));
        }
    }
}
