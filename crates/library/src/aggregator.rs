//! The result aggregator.
//!
//! Single consumer of every worker result. It owns the counters of the running
//! scan, feeds the metrics, relays new records to the search propagator and
//! decides when a scan is complete: once discovery has reported how many paths
//! it dispatched and that many results have come in. Results may arrive before
//! that report.

use crate::metrics::Metrics;
use crate::outcome::{ParseOutcome, ParseResult};
use crate::propagator::IndexCommand;
use crate::scheduler::SchedulerCommand;
use crate::state::{ScanCounters, ScanReport, ScanStatus};
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Log progress every this many results.
const PROGRESS_EVERY: u64 = 100;

#[derive(Debug)]
pub(crate) enum AggregatorEvent {
    /// A new scan started; counters reset.
    Begin { scan_id: u64, started_at: UtcDateTime },
    Processed(ParseResult),
    /// Discovery finished after queueing `total` paths. `failure` is set if it
    /// stopped because the book directory could not be listed, `interrupted`
    /// if it was cancelled before the walk was done.
    Dispatched {
        scan_id: u64,
        total: u64,
        failure: Option<String>,
        interrupted: bool,
    },
}

struct ActiveScan {
    scan_id: u64,
    started_at: UtcDateTime,
    counters: ScanCounters,
    dispatched: Option<u64>,
    failure: Option<String>,
    interrupted: bool,
}
impl ActiveScan {
    fn is_complete(&self) -> bool {
        self.dispatched.is_some_and(|total| self.counters.processed >= total)
    }

    fn report(self, status: ScanStatus) -> ScanReport {
        ScanReport {
            scan_id: self.scan_id,
            status,
            counters: self.counters,
            started_at: self.started_at,
            finished_at: UtcDateTime::now(),
            total_books: None,
        }
    }
}

pub(crate) struct Aggregator {
    active: Option<ActiveScan>,
    metrics: Arc<Metrics>,
    index: UnboundedSender<IndexCommand>,
    scheduler: mpsc::Sender<SchedulerCommand>,
}

impl Aggregator {
    pub(crate) fn new(
        metrics: Arc<Metrics>,
        index: UnboundedSender<IndexCommand>,
        scheduler: mpsc::Sender<SchedulerCommand>,
    ) -> Self {
        Self { active: None, metrics, index, scheduler }
    }

    /// Consume events until every sender is gone: the scheduler, discovery and
    /// all workers. A scan still open at that point is reported as
    /// interrupted. `stopped` is cancelled on exit, however that happens.
    pub(crate) async fn run(mut self, mut events: UnboundedReceiver<AggregatorEvent>, stopped: CancellationToken) {
        let _stopped = stopped.drop_guard();
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        if let Some(scan) = self.active.take() {
            tracing::warn!(scan_id = scan.scan_id, processed = scan.counters.processed, "scan interrupted");
            self.report(scan.report(ScanStatus::Interrupted)).await;
        }
        tracing::debug!("aggregator stopped");
    }

    async fn handle(&mut self, event: AggregatorEvent) {
        match event {
            AggregatorEvent::Begin { scan_id, started_at } => {
                if let Some(previous) = self.active.take() {
                    tracing::warn!(scan_id = previous.scan_id, "scan replaced before it completed");
                }
                self.active = Some(ActiveScan {
                    scan_id,
                    started_at,
                    counters: ScanCounters::default(),
                    dispatched: None,
                    failure: None,
                    interrupted: false,
                });
            },
            AggregatorEvent::Processed(result) => self.processed(result),
            AggregatorEvent::Dispatched { scan_id, total, failure, interrupted } => match self.active.as_mut() {
                Some(scan) if scan.scan_id == scan_id => {
                    scan.dispatched = Some(total);
                    scan.counters.discovered = total;
                    scan.failure = failure;
                    scan.interrupted = interrupted;
                },
                _ => tracing::warn!(scan_id, "dispatch report for a scan that is not running"),
            },
        }
        if self.active.as_ref().is_some_and(ActiveScan::is_complete)
            && let Some(scan) = self.active.take()
        {
            let status = match scan.failure.clone() {
                Some(reason) => ScanStatus::Failed(reason),
                None if scan.interrupted => ScanStatus::Interrupted,
                None => ScanStatus::Completed,
            };
            let report = scan.report(status);
            tracing::info!(
                scan_id = report.scan_id,
                status = %report.status,
                processed = report.counters.processed,
                added = report.counters.added,
                duplicate = report.counters.duplicate,
                invalid = report.counters.invalid,
                storage_errors = report.counters.storage_errors,
                "scan complete",
            );
            self.report(report).await;
        }
    }

    fn processed(&mut self, result: ParseResult) {
        self.metrics.record(result.outcome, result.elapsed);
        if result.outcome == ParseOutcome::StorageError {
            self.metrics.inc_db_errors();
        }
        // A stored book is indexed even if its scan has already been reported.
        if let Some(book) = result.book
            && self.index.send(IndexCommand::Add(book)).is_err()
        {
            tracing::error!(path = %result.path.display(), "search propagator stopped; book not indexed");
        }
        let Some(scan) = self.active.as_mut() else {
            tracing::warn!(path = %result.path.display(), "result arrived outside of a scan");
            return;
        };
        scan.counters.record(result.outcome);
        if scan.counters.processed % PROGRESS_EVERY == 0 {
            tracing::info!(scan_id = scan.scan_id, "scanned {} books so far", scan.counters.processed);
        }
        // Progress is a snapshot; a later one supersedes it, so a full channel
        // can drop it.
        _ = self.scheduler.try_send(SchedulerCommand::Progress(scan.counters));
    }

    async fn report(&self, report: ScanReport) {
        if self.scheduler.send(SchedulerCommand::Completed(report)).await.is_err() {
            tracing::debug!("scheduler stopped before the scan report was delivered");
        }
    }
}
