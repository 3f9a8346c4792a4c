//! Wiring of the pipeline tasks, and the handle the rest of the system uses.

use crate::aggregator::Aggregator;
use crate::error::{ErrorKind, Result};
use crate::gateway::{ExtractorHandle, StoreHandle};
use crate::metrics::Metrics;
use crate::pool::Worker;
use crate::propagator::Propagator;
use crate::scheduler::{Scheduler, SchedulerCommand, TriggerOutcome};
use crate::state::{ScanReport, ScanState};
use booksing_search::IndexHandle;
use booksing_storage::BackendHandle;
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const COMMAND_BUFFER: usize = 64;
const REPORT_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Concurrent ingestion workers.
    pub workers: usize,
    /// Records pushed to the search index per call.
    pub batch_size: usize,
    /// Longest a stored record waits before it is pushed to the search index.
    pub flush_interval: Duration,
    /// Time between automatic scans; `None` for manual scans only.
    pub scan_interval: Option<Duration>,
    /// Delete invalid and duplicate source files.
    pub allow_deletes: bool,
}
impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_size: 50,
            flush_interval: Duration::from_secs(10),
            scan_interval: None,
            allow_deletes: false,
        }
    }
}

/// The ingestion pipeline, before it is started.
pub struct Indexer {
    books: BackendHandle,
    store: StoreHandle,
    extractor: ExtractorHandle,
    index: IndexHandle,
    config: IndexerConfig,
}

impl Indexer {
    /// `books` is what gets scanned (and deleted from): an extension-filtered
    /// view of the book directory.
    pub fn new(
        books: BackendHandle,
        store: StoreHandle,
        extractor: ExtractorHandle,
        index: IndexHandle,
        config: IndexerConfig,
    ) -> Self {
        Self { books, store, extractor, index, config }
    }

    /// Spawn the pipeline tasks onto the current tokio runtime.
    pub fn start(self) -> IndexerHandle {
        let Self { books, store, extractor, index, config } = self;
        let metrics = Arc::new(Metrics::new());
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let (path_tx, path_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (index_tx, index_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ScanState::default());
        let (report_tx, _) = broadcast::channel(REPORT_BUFFER);

        let propagator = Propagator::new(index, config.batch_size, config.flush_interval, Arc::clone(&metrics));
        tracker.spawn(propagator.run(index_rx));

        let aggregator_stopped = CancellationToken::new();
        let aggregator = Aggregator::new(Arc::clone(&metrics), index_tx.clone(), command_tx.clone());
        tracker.spawn(aggregator.run(event_rx, aggregator_stopped.clone()));

        let worker = Worker {
            store: Arc::clone(&store),
            extractor,
            books: Arc::clone(&books),
            allow_deletes: config.allow_deletes,
        };
        Arc::new(worker).spawn(
            config.workers.max(1),
            &tracker,
            Arc::new(Mutex::new(path_rx)),
            event_tx.clone(),
            cancel.clone(),
        );

        let scheduler = Scheduler {
            state: ScanState::default(),
            state_tx,
            reports: report_tx.clone(),
            aggregator: Some(event_tx),
            index: index_tx,
            paths: path_tx,
            books,
            store,
            metrics: Arc::clone(&metrics),
            tracker: tracker.clone(),
            scan_interval: config.scan_interval,
            scan_started: UtcDateTime::now(),
        };
        tracker.spawn(scheduler.run(command_rx, cancel.clone(), aggregator_stopped));
        tracing::debug!(workers = config.workers, batch_size = config.batch_size, "indexer started");

        IndexerHandle {
            commands: command_tx,
            state: state_rx,
            reports: report_tx,
            metrics,
            tracker,
            cancel,
        }
    }
}

/// Cheaply cloneable access to a running [`Indexer`].
#[derive(Clone)]
pub struct IndexerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    state: watch::Receiver<ScanState>,
    reports: broadcast::Sender<ScanReport>,
    metrics: Arc<Metrics>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl IndexerHandle {
    /// Ask for a full scan. Does nothing if one is already running.
    pub async fn trigger_scan(&self) -> Result<TriggerOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.commands.send(SchedulerCommand::Trigger(reply)).await.or_raise(|| ErrorKind::Closed)?;
        outcome.await.or_raise(|| ErrorKind::Closed)
    }

    /// Trigger a scan (or join the one already running) and wait for its
    /// report.
    pub async fn scan(&self) -> Result<ScanReport> {
        let mut reports = self.subscribe();
        let scan_id = match self.trigger_scan().await? {
            TriggerOutcome::Started(scan_id) => scan_id,
            TriggerOutcome::AlreadyIndexing => self.state().scan_id,
        };
        loop {
            match reports.recv().await {
                Ok(report) if report.scan_id == scan_id => return Ok(report),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => exn::bail!(ErrorKind::Closed),
            }
        }
    }

    pub fn state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.state.clone()
    }

    /// Reports of every scan that finishes after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanReport> {
        self.reports.subscribe()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Stop the pipeline and wait for every task to finish. A running scan is
    /// reported as interrupted and pending search records get a final flush.
    pub async fn shutdown(&self) {
        tracing::debug!("indexer shutting down");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
