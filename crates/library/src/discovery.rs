//! File discovery: walk the book directory and feed the worker queue.

use crate::aggregator::AggregatorEvent;
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use booksing_storage::BackendHandle;
use booksing_storage::error::ErrorKind as StorageErrorKind;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Lazily list candidate book files, relative to the backend root.
///
/// `backend` is expected to be extension-filtered already. Unreadable
/// directories and entries are logged and skipped. A root that cannot be
/// listed at all ends the stream with a single [`Discovery`](ErrorKind::Discovery)
/// error. No ordering is guaranteed.
pub fn discover(backend: &BackendHandle) -> impl Stream<Item = Result<PathBuf>> + Send + '_ {
    stream! {
        for await item in backend.list_stream(None) {
            match item {
                Ok(info) => yield Ok(info.path),
                Err(err) if matches!(&*err, StorageErrorKind::RootUnavailable(_)) => {
                    yield Err::<PathBuf, _>(err).or_raise(|| ErrorKind::Discovery);
                    break;
                },
                Err(err) => tracing::warn!(backend = backend.name(), error = ?err, "skipping unreadable entry"),
            }
        }
    }
}

/// One scan's discovery task.
///
/// Every discovered path is pushed onto the worker queue, then the total is
/// reported to the aggregator so it can tell when the scan is complete. Stops
/// early when cancelled and reports what it sent so far, flagged as
/// interrupted.
pub(crate) async fn dispatch(
    scan_id: u64,
    backend: BackendHandle,
    paths: UnboundedSender<PathBuf>,
    aggregator: UnboundedSender<AggregatorEvent>,
    cancel: CancellationToken,
) {
    let mut total = 0;
    let mut failure = None;
    let mut interrupted = false;
    let mut files = std::pin::pin!(discover(&backend));
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(scan_id, dispatched = total, "discovery cancelled");
                interrupted = true;
                break;
            },
            item = files.next() => match item {
                Some(Ok(path)) => {
                    tracing::trace!(scan_id, path = %path.display(), "discovered book");
                    if paths.send(path).is_err() {
                        failure = Some("ingestion workers have stopped".to_string());
                        break;
                    }
                    total += 1;
                },
                Some(Err(err)) => {
                    tracing::error!(scan_id, error = ?err, "discovery failed");
                    failure = Some(err.to_string());
                    break;
                },
                None => break,
            },
        }
    }
    tracing::info!(scan_id, dispatched = total, interrupted, "discovery finished");
    let event = AggregatorEvent::Dispatched { scan_id, total, failure, interrupted };
    if aggregator.send(event).is_err() {
        tracing::debug!(scan_id, "aggregator stopped before discovery finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booksing_storage::backend::{ExtensionFilterBackend, LocalBackend, MockBackend};
    use futures::TryStreamExt;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn filtered(inner: BackendHandle) -> BackendHandle {
        Arc::new(ExtensionFilterBackend::new(inner, ["*.epub"]))
    }

    #[tokio::test]
    async fn test_discover_filters_extensions() {
        let backend = filtered(Arc::new(MockBackend::with_files([
            ("a.epub", b"a".to_vec()),
            ("shelf/b.EPUB", b"b".to_vec()),
            ("shelf/b.mobi", b"b".to_vec()),
            ("notes.txt", b"c".to_vec()),
        ])));
        let mut paths: Vec<PathBuf> = discover(&backend).try_collect().await.unwrap();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("a.epub"), PathBuf::from("shelf/b.EPUB")]);
    }

    #[tokio::test]
    async fn test_discover_unavailable_root() {
        let backend = filtered(Arc::new(MockBackend::with_files([("a.epub", b"a".to_vec())]).unavailable()));
        let items: Vec<_> = discover(&backend).collect().await;
        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert_eq!(*err, ErrorKind::Discovery);
    }

    #[tokio::test]
    async fn test_discover_missing_local_root() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalBackend::new("books", dir.path().join("not-mounted")).unwrap();
        let backend = filtered(Arc::new(local));
        let items: Vec<_> = discover(&backend).collect().await;
        assert!(matches!(items.as_slice(), [Err(_)]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_skips_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.epub"), b"ok").unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("hidden.epub"), b"hidden").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores permission bits, so this only means something otherwise.
        let readable = std::fs::read_dir(&locked).is_ok();

        let backend = filtered(Arc::new(LocalBackend::new("books", dir.path()).unwrap()));
        let items: Vec<_> = discover(&backend).collect().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let paths: Vec<_> = items.into_iter().map(|item| item.unwrap()).collect();
        assert!(paths.contains(&PathBuf::from("ok.epub")));
        assert_eq!(paths.len(), if readable { 2 } else { 1 });
    }

    #[tokio::test]
    async fn test_dispatch_reports_total() {
        let backend = filtered(Arc::new(MockBackend::with_files([
            ("a.epub", b"a".to_vec()),
            ("b.epub", b"b".to_vec()),
            ("c.txt", b"c".to_vec()),
        ])));
        let (path_tx, mut path_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        dispatch(7, backend, path_tx, event_tx, CancellationToken::new()).await;

        let mut queued = Vec::new();
        while let Ok(path) = path_rx.try_recv() {
            queued.push(path);
        }
        queued.sort();
        assert_eq!(queued, vec![Path::new("a.epub"), Path::new("b.epub")]);
        match event_rx.recv().await.unwrap() {
            AggregatorEvent::Dispatched { scan_id, total, failure, interrupted } => {
                assert_eq!(scan_id, 7);
                assert_eq!(total, 2);
                assert!(failure.is_none());
                assert!(!interrupted);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_unavailable_root() {
        let backend = filtered(Arc::new(MockBackend::default().unavailable()));
        let (path_tx, mut path_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        dispatch(1, backend, path_tx, event_tx, CancellationToken::new()).await;

        assert!(path_rx.try_recv().is_err());
        match event_rx.recv().await.unwrap() {
            AggregatorEvent::Dispatched { total, failure, .. } => {
                assert_eq!(total, 0);
                assert!(failure.is_some());
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_cancelled_is_interrupted() {
        let backend = filtered(Arc::new(MockBackend::with_files([
            ("a.epub", b"a".to_vec()),
            ("b.epub", b"b".to_vec()),
        ])));
        let (path_tx, mut path_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        dispatch(3, backend, path_tx, event_tx, cancel).await;

        assert!(path_rx.try_recv().is_err());
        match event_rx.recv().await.unwrap() {
            AggregatorEvent::Dispatched { scan_id, total, failure, interrupted } => {
                assert_eq!(scan_id, 3);
                assert_eq!(total, 0);
                assert!(failure.is_none());
                assert!(interrupted);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }
}
