use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// A snapshot of how many books the library held at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookCount {
    pub counted_at: UtcDateTime,
    pub total: u64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookCountRow {
    pub(crate) counted_at: i64,
    pub(crate) total: i64,
}
impl TryFrom<BookCountRow> for BookCount {
    type Error = Error;
    fn try_from(row: BookCountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            counted_at: UtcDateTime::from_unix_timestamp(row.counted_at)
                .or_raise(|| ErrorKind::InvalidData("counted at"))?,
            total: u64::try_from(row.total).or_raise(|| ErrorKind::InvalidData("total"))?,
        })
    }
}
