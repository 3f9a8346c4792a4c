//! The ingestion worker pool.
//!
//! `W` long-lived workers pull relative paths off one shared queue, classify
//! each into a [`ParseOutcome`] and hand the result to the aggregator.

use crate::aggregator::AggregatorEvent;
use crate::gateway::{ExtractorHandle, Insertion, StoreHandle};
use crate::outcome::{ParseOutcome, ParseResult};
use booksing_extract::models::BookRecord;
use booksing_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub(crate) type PathQueue = Arc<Mutex<UnboundedReceiver<PathBuf>>>;

/// Everything a worker needs to classify one path.
pub(crate) struct Worker {
    pub store: StoreHandle,
    pub extractor: ExtractorHandle,
    /// Used for deletes only.
    pub books: BackendHandle,
    pub allow_deletes: bool,
}

impl Worker {
    /// Spawn `count` workers onto `tracker`.
    pub(crate) fn spawn(
        self: Arc<Self>,
        count: usize,
        tracker: &TaskTracker,
        queue: PathQueue,
        results: UnboundedSender<AggregatorEvent>,
        cancel: CancellationToken,
    ) {
        for id in 0..count {
            tracker.spawn(Arc::clone(&self).run(id, Arc::clone(&queue), results.clone(), cancel.clone()));
        }
    }

    async fn run(
        self: Arc<Self>,
        id: usize,
        queue: PathQueue,
        results: UnboundedSender<AggregatorEvent>,
        cancel: CancellationToken,
    ) {
        tracing::trace!(worker = id, "ingestion worker starting");
        loop {
            let path = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    path = queue.recv() => path,
                }
            };
            let Some(path) = path else { break };
            // A book that was picked up is always finished and reported.
            let result = self.process(path).await;
            if results.send(AggregatorEvent::Processed(result)).is_err() {
                break;
            }
        }
        tracing::trace!(worker = id, "ingestion worker stopped");
    }

    pub(crate) async fn process(&self, path: PathBuf) -> ParseResult {
        let started = Instant::now();
        match self.classify(&path).await {
            (ParseOutcome::Added, Some(book)) => ParseResult::added(path, book, started.elapsed()),
            (outcome, _) => ParseResult::new(path, outcome, started.elapsed()),
        }
    }

    async fn classify(&self, path: &Path) -> (ParseOutcome, Option<BookRecord>) {
        match self.store.exists_by_path(path).await {
            Ok(true) => return (ParseOutcome::Unchanged, None),
            Ok(false) => {},
            Err(err) => {
                tracing::warn!(path = %path.display(), error = ?err, "could not look up book by path");
                return (ParseOutcome::StorageError, None);
            },
        }

        let book = match self.extractor.extract(path).await {
            Ok(book) => book,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = ?err, "not a valid book");
                self.discard(path).await;
                return (ParseOutcome::Invalid, None);
            },
        };

        match self.store.exists_by_hash(&book.hash).await {
            Ok(true) => {
                tracing::info!(path = %path.display(), hash = %book.hash, "duplicate book");
                self.discard(path).await;
                return (ParseOutcome::Duplicate, None);
            },
            Ok(false) => {},
            Err(err) => {
                tracing::warn!(path = %path.display(), error = ?err, "could not look up book by hash");
                return (ParseOutcome::StorageError, None);
            },
        }

        match self.store.insert(&book).await {
            Ok(Insertion::Inserted) => {
                tracing::debug!(path = %path.display(), hash = %book.hash, title = %book.title, "added book");
                (ParseOutcome::Added, Some(book))
            },
            Ok(Insertion::AlreadyExists) => {
                tracing::info!(path = %path.display(), hash = %book.hash, "duplicate book stored concurrently");
                self.discard(path).await;
                (ParseOutcome::Duplicate, None)
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = ?err, "could not store book");
                (ParseOutcome::StorageError, None)
            },
        }
    }

    /// Delete a rejected source file, if deletes are allowed. Never fails.
    async fn discard(&self, path: &Path) {
        if !self.allow_deletes {
            return;
        }
        match self.books.delete(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "deleted source file"),
            Err(err) => tracing::warn!(path = %path.display(), error = ?err, "could not delete source file"),
        }
    }
}
