/// Descriptive metadata read from an EPUB package document.
///
/// Title and author are already normalised (see [`crate::normalize`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Book title (`dc:title`)
    pub title: String,
    /// Primary author (first `dc:creator`), `"Unknown"` when absent
    pub author: String,
    /// Language code (`dc:language`)
    pub language: Option<String>,
    /// Publisher blurb (`dc:description`)
    pub description: Option<String>,
    /// Publisher identifier such as an ISBN or UUID (`dc:identifier`)
    pub identifier: Option<String>,
}
