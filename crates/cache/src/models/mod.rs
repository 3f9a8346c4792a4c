mod book;
mod count;

pub(crate) use self::book::BookRow;
pub use self::count::BookCount;
pub(crate) use self::count::BookCountRow;
