//! Scan state as observed from outside the pipeline.

use crate::outcome::ParseOutcome;
use derive_more::Display;
use time::UtcDateTime;

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPhase {
    #[default]
    #[display("idle")]
    Idle,
    #[display("indexing")]
    Indexing,
}

/// Running totals for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    /// Paths handed to the workers; only known once discovery has finished.
    pub discovered: u64,
    /// Results received so far, whatever their outcome.
    pub processed: u64,
    pub unchanged: u64,
    pub added: u64,
    pub duplicate: u64,
    pub invalid: u64,
    pub storage_errors: u64,
}
impl ScanCounters {
    pub fn record(&mut self, outcome: ParseOutcome) {
        self.processed += 1;
        let counter = match outcome {
            ParseOutcome::Unchanged => &mut self.unchanged,
            ParseOutcome::Added => &mut self.added,
            ParseOutcome::Duplicate => &mut self.duplicate,
            ParseOutcome::Invalid => &mut self.invalid,
            ParseOutcome::StorageError => &mut self.storage_errors,
        };
        *counter += 1;
    }

    pub fn get(&self, outcome: ParseOutcome) -> u64 {
        match outcome {
            ParseOutcome::Unchanged => self.unchanged,
            ParseOutcome::Added => self.added,
            ParseOutcome::Duplicate => self.duplicate,
            ParseOutcome::Invalid => self.invalid,
            ParseOutcome::StorageError => self.storage_errors,
        }
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    #[display("completed")]
    Completed,
    /// Discovery failed; whatever was dispatched before the failure was still
    /// processed.
    #[display("failed: {_0}")]
    Failed(String),
    /// The pipeline was stopped before every dispatched path was processed.
    #[display("interrupted")]
    Interrupted,
}

/// Summary of a finished scan, broadcast to completion subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub scan_id: u64,
    pub status: ScanStatus,
    pub counters: ScanCounters,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    /// Books stored after the scan, if the database could be asked.
    pub total_books: Option<u64>,
}

/// What [`IndexerHandle::state`](crate::IndexerHandle::state) returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub phase: ScanPhase,
    /// The running scan, or the last one; `0` before the first scan.
    pub scan_id: u64,
    pub counters: ScanCounters,
    pub last_report: Option<ScanReport>,
}
impl ScanState {
    pub fn is_indexing(&self) -> bool {
        self.phase == ScanPhase::Indexing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut counters = ScanCounters::default();
        for outcome in [ParseOutcome::Added, ParseOutcome::Added, ParseOutcome::Invalid] {
            counters.record(outcome);
        }
        assert_eq!(counters.processed, 3);
        assert_eq!(counters.get(ParseOutcome::Added), 2);
        assert_eq!(counters.get(ParseOutcome::Invalid), 1);
        assert_eq!(counters.get(ParseOutcome::Duplicate), 0);
        assert_eq!(counters.discovered, 0);
    }
}
