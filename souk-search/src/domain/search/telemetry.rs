//! Fire-and-forget logging of executed searches.
//!
//! Entries flow through a bounded channel into a single background worker
//! that owns its own storage handle. Recording never blocks the request
//! path; a full buffer or a stopped worker drops the entry with a warning.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::traits::SearchLogRepository;
use super::types::SearchLogEntry;

pub const DEFAULT_LOG_BUFFER: usize = 256;

/// Handle for dispatching search telemetry to the background worker.
#[derive(Clone)]
pub struct SearchLogger {
    tx: mpsc::Sender<SearchLogEntry>,
}

impl SearchLogger {
    /// Spawn the log worker and return a logger handle plus the worker's
    /// join handle. The worker drains remaining entries and exits once every
    /// logger clone has been dropped.
    pub fn spawn<L>(sink: Arc<L>, buffer: usize) -> (Self, JoinHandle<()>)
    where
        L: SearchLogRepository + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_log_worker(rx, sink));
        (Self { tx }, handle)
    }

    /// Record one search. Best effort: never blocks, never fails the caller.
    pub fn record(&self, query: &str, result_count: i64, source: &str) {
        let entry = SearchLogEntry {
            query: query.to_string(),
            result_count,
            source: source.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("search log buffer full, dropping entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("search log worker stopped, dropping entry");
            }
        }
    }
}

async fn run_log_worker<L>(mut rx: mpsc::Receiver<SearchLogEntry>, sink: Arc<L>)
where
    L: SearchLogRepository,
{
    while let Some(entry) = rx.recv().await {
        if let Err(err) = sink.insert_search_log(&entry).await {
            warn!(error = %err, query = %entry.query, "failed to persist search log entry");
        }
    }

    debug!("search log worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::search::store::MockSearchStore;

    #[tokio::test]
    async fn entries_reach_the_sink() {
        let sink = Arc::new(MockSearchStore::new());
        let (logger, handle) = SearchLogger::spawn(sink.clone(), 8);

        logger.record("python", 3, "web");
        logger.record("rust", 0, "api");

        // Closing the channel lets the worker drain and exit.
        drop(logger);
        handle.await.unwrap();

        let logged = sink.logged();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].query, "python");
        assert_eq!(logged[0].result_count, 3);
        assert_eq!(logged[0].source, "web");
        assert_eq!(logged[1].query, "rust");
        assert_eq!(logged[1].source, "api");
    }

    #[tokio::test]
    async fn record_after_worker_stop_is_harmless() {
        let sink = Arc::new(MockSearchStore::new());
        let (logger, handle) = SearchLogger::spawn(sink, 1);

        // Kill the worker, then keep recording.
        handle.abort();
        let _ = handle.await;

        logger.record("orphaned", 1, "web");
        logger.record("orphaned again", 2, "web");
    }
}
