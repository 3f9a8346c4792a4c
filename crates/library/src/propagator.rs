//! The search propagator.
//!
//! Buffers newly added records and pushes them to the search index in batches.
//! The buffer is flushed when it reaches `batch_size`, when the oldest record
//! has waited `flush_interval`, when a flush is requested, and one last time
//! when the command channel closes. A failed push keeps the unsent records and
//! retries them one `flush_interval` later; nothing is dropped silently.

use crate::metrics::Metrics;
use booksing_extract::models::BookRecord;
use booksing_search::IndexHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) enum IndexCommand {
    Add(Box<BookRecord>),
    /// Flush now; the reply is the number of records still not indexed.
    Flush(oneshot::Sender<usize>),
}

pub(crate) struct Propagator {
    index: IndexHandle,
    batch_size: usize,
    flush_interval: Duration,
    metrics: Arc<Metrics>,
    batch: Vec<BookRecord>,
    deadline: Option<Instant>,
    retrying: bool,
}

impl Propagator {
    pub(crate) fn new(index: IndexHandle, batch_size: usize, flush_interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
            flush_interval,
            metrics,
            batch: Vec::new(),
            deadline: None,
            retrying: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<IndexCommand>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(IndexCommand::Add(book)) => self.add(*book).await,
                    Some(IndexCommand::Flush(reply)) => {
                        self.flush().await;
                        _ = reply.send(self.batch.len());
                    },
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush().await;
                },
            }
        }
        self.flush().await;
        if !self.batch.is_empty() {
            let hashes: Vec<&str> = self.batch.iter().map(|book| book.hash.as_str()).collect();
            tracing::error!(count = hashes.len(), ?hashes, "books were stored but never indexed");
        }
        tracing::debug!("search propagator stopped");
    }

    async fn add(&mut self, book: BookRecord) {
        if self.batch.is_empty() && self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.flush_interval);
        }
        self.batch.push(book);
        if !self.retrying && self.batch.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Push the whole buffer in chunks of `batch_size`, stopping at the first
    /// failed chunk.
    async fn flush(&mut self) {
        while !self.batch.is_empty() {
            let end = self.batch.len().min(self.batch_size);
            match self.index.add_books(&self.batch[..end]).await {
                Ok(()) => {
                    tracing::debug!(count = end, "indexed books");
                    self.batch.drain(..end);
                },
                Err(err) => {
                    self.metrics.inc_search_errors();
                    tracing::warn!(
                        pending = self.batch.len(),
                        retry_in = ?self.flush_interval,
                        error = ?err,
                        "could not push books to the search index",
                    );
                    self.retrying = true;
                    self.deadline = Some(Instant::now() + self.flush_interval);
                    return;
                },
            }
        }
        self.retrying = false;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyIndex;
    use booksing_extract::models::Metadata;
    use booksing_search::SearchIndex;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::{self, UnboundedSender};
    use tokio::task::JoinHandle;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn book(n: usize) -> Box<BookRecord> {
        let metadata = Metadata {
            title: format!("Book {n}"),
            author: "Anon".to_string(),
            language: None,
            description: None,
            identifier: None,
        };
        Box::new(BookRecord::new(format!("hash{n}"), format!("{n}.epub"), 1, metadata))
    }

    fn start(index: Arc<FlakyIndex>, batch_size: usize) -> (UnboundedSender<IndexCommand>, Arc<Metrics>, JoinHandle<()>) {
        let metrics = Arc::new(Metrics::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let propagator = Propagator::new(index, batch_size, INTERVAL, metrics.clone());
        (tx, metrics, tokio::spawn(propagator.run(rx)))
    }

    async fn indexed(index: &FlakyIndex) -> usize {
        index.inner.len().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_flush() {
        let index = Arc::new(FlakyIndex::default());
        let (tx, _, _task) = start(index.clone(), 2);
        for n in 0..3 {
            tx.send(IndexCommand::Add(book(n))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(indexed(&index).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_triggered_flush() {
        let index = Arc::new(FlakyIndex::default());
        let (tx, _, _task) = start(index.clone(), 50);
        tx.send(IndexCommand::Add(book(0))).unwrap();
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(indexed(&index).await, 0);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(indexed(&index).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_flush_is_ordered_after_adds() {
        let index = Arc::new(FlakyIndex::default());
        let (tx, _, _task) = start(index.clone(), 2);
        for n in 0..5 {
            tx.send(IndexCommand::Add(book(n))).unwrap();
        }
        let (reply, pending) = oneshot::channel();
        tx.send(IndexCommand::Flush(reply)).unwrap();
        assert_eq!(pending.await.unwrap(), 0);
        assert_eq!(indexed(&index).await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_is_retried() {
        let index = Arc::new(FlakyIndex::failing(1));
        let (tx, metrics, _task) = start(index.clone(), 2);
        tx.send(IndexCommand::Add(book(0))).unwrap();
        tx.send(IndexCommand::Add(book(1))).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(metrics.search_errors(), 1);
        assert_eq!(indexed(&index).await, 0);

        // Over the batch size, but the retry deadline has not passed yet.
        tx.send(IndexCommand::Add(book(2))).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(indexed(&index).await, 3);
        assert_eq!(metrics.search_errors(), 1);
        // One failed call, then chunks of two and one.
        assert_eq!(index.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_reply_reports_pending() {
        let index = Arc::new(FlakyIndex::failing(1));
        let (tx, _, _task) = start(index.clone(), 50);
        tx.send(IndexCommand::Add(book(0))).unwrap();
        let (reply, pending) = oneshot::channel();
        tx.send(IndexCommand::Flush(reply)).unwrap();
        assert_eq!(pending.await.unwrap(), 1);
        let (reply, pending) = oneshot::channel();
        tx.send(IndexCommand::Flush(reply)).unwrap();
        assert_eq!(pending.await.unwrap(), 0);
        assert!(index.get_book_by_hash("hash0").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_on_close() {
        let index = Arc::new(FlakyIndex::default());
        let (tx, _, task) = start(index.clone(), 50);
        tx.send(IndexCommand::Add(book(0))).unwrap();
        tx.send(IndexCommand::Add(book(1))).unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(indexed(&index).await, 2);
    }
}
