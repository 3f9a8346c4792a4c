mod book;
mod format;
mod metadata;

pub use self::book::BookRecord;
pub use self::format::Format;
pub use self::metadata::Metadata;
