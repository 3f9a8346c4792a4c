//! Pipeline metrics.
//!
//! Plain atomics, shared by every task through an `Arc`. Counters only ever
//! go up; the two gauges are set by the scheduler when a scan starts and
//! finishes.

use crate::outcome::ParseOutcome;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    books_processed: [AtomicU64; ParseOutcome::ALL.len()],
    books_duration_micros: [AtomicU64; ParseOutcome::ALL.len()],
    search_errors: AtomicU64,
    db_errors: AtomicU64,
    indexing: AtomicBool,
    books_in_index: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub books_processed: [u64; ParseOutcome::ALL.len()],
    pub books_duration_seconds: [f64; ParseOutcome::ALL.len()],
    pub search_errors: u64,
    pub db_errors: u64,
    pub indexing: bool,
    pub books_in_index: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: ParseOutcome, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.books_processed[outcome.index()].fetch_add(1, Ordering::Relaxed);
        self.books_duration_micros[outcome.index()].fetch_add(micros, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_search_errors(&self) {
        self.search_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_db_errors(&self) {
        self.db_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_indexing(&self, indexing: bool) {
        self.indexing.store(indexing, Ordering::Relaxed);
    }

    pub fn set_books_in_index(&self, total: u64) {
        self.books_in_index.store(total, Ordering::Relaxed);
    }

    pub fn books_processed(&self, outcome: ParseOutcome) -> u64 {
        self.books_processed[outcome.index()].load(Ordering::Relaxed)
    }

    pub fn search_errors(&self) -> u64 {
        self.search_errors.load(Ordering::Relaxed)
    }

    pub fn db_errors(&self) -> u64 {
        self.db_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            books_processed: std::array::from_fn(|i| self.books_processed[i].load(Ordering::Relaxed)),
            books_duration_seconds: std::array::from_fn(|i| {
                Duration::from_micros(self.books_duration_micros[i].load(Ordering::Relaxed)).as_secs_f64()
            }),
            search_errors: self.search_errors(),
            db_errors: self.db_errors(),
            indexing: self.indexing.load(Ordering::Relaxed),
            books_in_index: self.books_in_index.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format.
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        // Writing to a String cannot fail.
        _ = writeln!(out, "# HELP booksing_books_processed The number of processed books");
        _ = writeln!(out, "# TYPE booksing_books_processed counter");
        for outcome in ParseOutcome::ALL {
            let value = s.books_processed[outcome.index()];
            _ = writeln!(out, "booksing_books_processed{{transaction=\"{outcome}\"}} {value}");
        }
        _ = writeln!(out, "\n# HELP booksing_books_duration_seconds The time taken to process the books in seconds");
        _ = writeln!(out, "# TYPE booksing_books_duration_seconds counter");
        for outcome in ParseOutcome::ALL {
            let value = s.books_duration_seconds[outcome.index()];
            _ = writeln!(out, "booksing_books_duration_seconds{{transaction=\"{outcome}\"}} {value}");
        }
        _ = write!(
            out,
            r#"
# HELP booksing_search_errors The number of errors encountered when contacting search
# TYPE booksing_search_errors counter
booksing_search_errors {}

# HELP booksing_db_errors The number of errors encountered when using the db
# TYPE booksing_db_errors counter
booksing_db_errors {}

# HELP booksing_indexing Whether booksing is indexing or not
# TYPE booksing_indexing gauge
booksing_indexing {}

# HELP booksing_books_in_index Total number of books available for searching
# TYPE booksing_books_in_index gauge
booksing_books_in_index {}
"#,
            s.search_errors,
            s.db_errors,
            u8::from(s.indexing),
            s.books_in_index,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record(ParseOutcome::Added, Duration::from_millis(1500));
        metrics.record(ParseOutcome::Added, Duration::from_millis(500));
        metrics.record(ParseOutcome::Invalid, Duration::from_millis(10));
        metrics.inc_db_errors();
        metrics.set_indexing(true);
        metrics.set_books_in_index(42);

        let s = metrics.snapshot();
        assert_eq!(s.books_processed[ParseOutcome::Added.index()], 2);
        assert_eq!(s.books_duration_seconds[ParseOutcome::Added.index()], 2.0);
        assert_eq!(metrics.books_processed(ParseOutcome::Invalid), 1);
        assert_eq!(metrics.books_processed(ParseOutcome::Duplicate), 0);
        assert_eq!(s.db_errors, 1);
        assert_eq!(s.search_errors, 0);
        assert!(s.indexing);
        assert_eq!(s.books_in_index, 42);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record(ParseOutcome::Duplicate, Duration::from_secs(1));
        metrics.inc_search_errors();
        let text = metrics.prometheus_format();
        assert!(text.contains("# TYPE booksing_books_processed counter"));
        assert!(text.contains("booksing_books_processed{transaction=\"duplicate\"} 1\n"));
        assert!(text.contains("booksing_books_processed{transaction=\"storage_error\"} 0\n"));
        assert!(text.contains("booksing_books_duration_seconds{transaction=\"duplicate\"} 1\n"));
        assert!(text.contains("booksing_search_errors 1\n"));
        assert!(text.contains("booksing_indexing 0\n"));
    }
}
