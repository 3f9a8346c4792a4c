//! SQLite book database.
//!
//! Tracks every unique book (keyed by content hash) that has been ingested
//! into the library, plus a history of book counts taken after each scan.
//! The book files on disk remain the source of truth: deleting the database
//! and rescanning rebuilds it.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::BookCount;
pub use crate::repo::{Insertion, Repository};
