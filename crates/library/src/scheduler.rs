//! The scan scheduler.
//!
//! The only writer of [`ScanState`]. Scans are started by trigger requests,
//! manual or from the interval timer, and only while idle; the aggregator's
//! completion report is what moves the state back to idle, after the search
//! index has been flushed and the stored book count recorded.

use crate::aggregator::AggregatorEvent;
use crate::discovery;
use crate::gateway::StoreHandle;
use crate::metrics::Metrics;
use crate::propagator::IndexCommand;
use crate::state::{ScanCounters, ScanPhase, ScanReport, ScanState, ScanStatus};
use booksing_storage::BackendHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Answer to a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new scan with this id is running.
    Started(u64),
    /// A scan was already running; nothing was started.
    AlreadyIndexing,
}

#[derive(Debug)]
pub(crate) enum SchedulerCommand {
    Trigger(oneshot::Sender<TriggerOutcome>),
    Progress(ScanCounters),
    Completed(ScanReport),
}

pub(crate) struct Scheduler {
    pub state: ScanState,
    pub state_tx: watch::Sender<ScanState>,
    pub reports: broadcast::Sender<ScanReport>,
    /// Dropped on stop, so the aggregator can see every producer is gone.
    pub aggregator: Option<UnboundedSender<AggregatorEvent>>,
    pub index: UnboundedSender<IndexCommand>,
    pub paths: UnboundedSender<PathBuf>,
    pub books: BackendHandle,
    pub store: StoreHandle,
    pub metrics: Arc<Metrics>,
    pub tracker: TaskTracker,
    pub scan_interval: Option<Duration>,
    pub scan_started: UtcDateTime,
}

impl Scheduler {
    /// `aggregator_stopped` fires when the aggregator task has exited.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<SchedulerCommand>,
        cancel: CancellationToken,
        aggregator_stopped: CancellationToken,
    ) {
        let mut timer = self.scan_interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command, &cancel).await,
                    None => break,
                },
                _ = next_tick(&mut timer) => match self.trigger(&cancel) {
                    Some(TriggerOutcome::Started(scan_id)) => tracing::info!(scan_id, "scheduled scan started"),
                    Some(TriggerOutcome::AlreadyIndexing) => tracing::debug!("scheduled scan skipped; already indexing"),
                    None => {},
                },
            }
        }

        // Dispatching stops on the same token and workers finish the book in
        // hand; the aggregator then reports whatever was running.
        self.aggregator = None;
        while self.state.is_indexing() {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle(command, &cancel).await,
                    None => self.abandon().await,
                },
                _ = aggregator_stopped.cancelled() => self.abandon().await,
            }
        }
        tracing::debug!("scheduler stopped");
    }

    /// Nothing is left to report the running scan; close it as interrupted.
    async fn abandon(&mut self) {
        tracing::warn!(scan_id = self.state.scan_id, "no report for interrupted scan");
        let report = ScanReport {
            scan_id: self.state.scan_id,
            status: ScanStatus::Interrupted,
            counters: self.state.counters,
            started_at: self.scan_started,
            finished_at: UtcDateTime::now(),
            total_books: None,
        };
        self.complete(report).await;
    }

    async fn handle(&mut self, command: SchedulerCommand, cancel: &CancellationToken) {
        match command {
            SchedulerCommand::Trigger(reply) => {
                if let Some(outcome) = self.trigger(cancel) {
                    _ = reply.send(outcome);
                }
            },
            SchedulerCommand::Progress(counters) => {
                if self.state.is_indexing() {
                    self.state.counters = counters;
                    self.publish();
                }
            },
            SchedulerCommand::Completed(report) => self.complete(report).await,
        }
    }

    /// Start a scan if idle. `None` means the pipeline is shutting down.
    fn trigger(&mut self, cancel: &CancellationToken) -> Option<TriggerOutcome> {
        if self.state.is_indexing() {
            return Some(TriggerOutcome::AlreadyIndexing);
        }
        if cancel.is_cancelled() {
            return None;
        }
        let aggregator = self.aggregator.clone()?;
        let scan_id = self.state.scan_id + 1;
        let started_at = UtcDateTime::now();
        if aggregator.send(AggregatorEvent::Begin { scan_id, started_at }).is_err() {
            tracing::warn!(scan_id, "aggregator stopped; scan not started");
            return None;
        }
        self.scan_started = started_at;
        self.state.scan_id = scan_id;
        self.state.phase = ScanPhase::Indexing;
        self.state.counters = ScanCounters::default();
        self.metrics.set_indexing(true);
        self.publish();
        tracing::info!(scan_id, backend = self.books.name(), "scan started");

        self.tracker.spawn(discovery::dispatch(
            scan_id,
            Arc::clone(&self.books),
            self.paths.clone(),
            aggregator,
            cancel.clone(),
        ));
        Some(TriggerOutcome::Started(scan_id))
    }

    async fn complete(&mut self, mut report: ScanReport) {
        if !self.state.is_indexing() || report.scan_id != self.state.scan_id {
            tracing::warn!(scan_id = report.scan_id, "ignoring report for a scan that is not running");
            return;
        }

        let (reply, pending) = oneshot::channel();
        if self.index.send(IndexCommand::Flush(reply)).is_ok() {
            match pending.await {
                Ok(0) => {},
                Ok(pending) => tracing::warn!(scan_id = report.scan_id, pending, "search index is behind; will retry"),
                Err(_) => tracing::error!(scan_id = report.scan_id, "search propagator stopped"),
            }
        }

        match self.store.book_count().await {
            Ok(total) => {
                report.total_books = Some(total);
                self.metrics.set_books_in_index(total);
                if let Err(err) = self.store.update_book_count(total).await {
                    self.metrics.inc_db_errors();
                    tracing::warn!(scan_id = report.scan_id, error = ?err, "could not record book count");
                }
            },
            Err(err) => {
                self.metrics.inc_db_errors();
                tracing::warn!(scan_id = report.scan_id, error = ?err, "could not count books");
            },
        }

        self.metrics.set_indexing(false);
        self.state.phase = ScanPhase::Idle;
        self.state.counters = report.counters;
        self.state.last_report = Some(report.clone());
        self.publish();
        tracing::info!(
            scan_id = report.scan_id,
            status = %report.status,
            total_books = ?report.total_books,
            "scan finished",
        );

        // Nobody listening is fine.
        _ = self.reports.send(report);
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        },
        None => std::future::pending().await,
    }
}
