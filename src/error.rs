//! Binary Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("could not set up logging")]
    Logging,
    #[display("could not open the book database")]
    Database,
    #[display("could not open the book directory")]
    Library,
    #[display("indexing failed")]
    Indexer,
    #[display("search failed")]
    Search,
}
