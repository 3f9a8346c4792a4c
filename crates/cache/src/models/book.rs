use crate::error::{Error, ErrorKind};
use booksing_extract::models::{BookRecord, Format};
use exn::{OptionExt, ResultExt};
use std::collections::BTreeSet;
use std::path::PathBuf;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) hash: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) language: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) path: String,
    pub(crate) size: i64,
    pub(crate) alternates: String,
    pub(crate) added_at: i64,
}
impl TryFrom<&BookRecord> for BookRow {
    type Error = Error;
    fn try_from(book: &BookRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: book.hash.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            language: book.language.clone(),
            description: book.description.clone(),
            path: book.path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            size: i64::try_from(book.size).or_raise(|| ErrorKind::InvalidData("size"))?,
            alternates: book.alternates.iter().map(Format::to_string).collect::<Vec<_>>().join(","),
            added_at: book.added_at.unix_timestamp(),
        })
    }
}
impl TryFrom<BookRow> for BookRecord {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let alternates = row
            .alternates
            .split(',')
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.parse::<Format>().ok().ok_or_raise(|| ErrorKind::InvalidData("alternates")))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            hash: row.hash,
            title: row.title,
            author: row.author,
            language: row.language,
            description: row.description,
            path: PathBuf::from(row.path),
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("size"))?,
            alternates,
            added_at: UtcDateTime::from_unix_timestamp(row.added_at).or_raise(|| ErrorKind::InvalidData("added at"))?,
        })
    }
}
