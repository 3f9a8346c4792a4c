//! The book-ingestion pipeline.
//!
//! ```text
//! Scheduler → discovery → path queue → workers → aggregator → scheduler
//!                                                     ↓
//!                                      search propagator → search index
//! ```
//!
//! [`Indexer::start`] spawns every task and returns an [`IndexerHandle`] for
//! triggering scans, watching [`ScanState`], receiving [`ScanReport`]s and
//! reading [`Metrics`]. The database, the book files and the search index are
//! reached through the traits in [`gateway`] and the storage and search crates.

mod aggregator;
mod discovery;
pub mod error;
pub mod gateway;
mod indexer;
mod metrics;
mod outcome;
mod pool;
mod propagator;
mod scheduler;
mod state;
#[cfg(test)]
mod testing;

pub use crate::discovery::discover;
pub use crate::indexer::{Indexer, IndexerConfig, IndexerHandle};
pub use crate::metrics::{Metrics, MetricsSnapshot};
pub use crate::outcome::{ParseOutcome, ParseResult};
pub use crate::scheduler::TriggerOutcome;
pub use crate::state::{ScanCounters, ScanPhase, ScanReport, ScanState, ScanStatus};
