//! Optional remote mirror of local progress.
//!
//! Every operation is attempted immediately when the client believes it is
//! online; anything that cannot be delivered goes to the durable FIFO queue
//! and is replayed later. Nothing here is required for offline play.

pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::store::operations::sync_queue::PendingOperation;
use crate::store::{Store, StoreError};

pub use transport::{HttpTransport, RemoteTransport};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync endpoint not configured")]
    NotConfigured,
    #[error("remote unreachable")]
    Offline,
    #[error("sync network error: {0}")]
    Network(String),
    #[error("sync rejected: status={status}, message={message}")]
    Rejected { status: u16, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Errors meaning the remote could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Offline | Self::Network(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Delivered,
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub delivered: usize,
    pub kept: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub pending: usize,
}

pub struct SyncClient {
    store: Arc<Store>,
    transport: Arc<dyn RemoteTransport>,
    online: AtomicBool,
    replay_guard: Mutex<()>,
}

impl SyncClient {
    pub fn new(store: Arc<Store>, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            store,
            transport,
            online: AtomicBool::new(true),
            replay_guard: Mutex::new(()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            online: self.online.load(Ordering::SeqCst),
            pending: self.store.pending_operation_count(),
        }
    }

    /// Updates connectivity. Coming back online triggers a replay pass.
    pub async fn set_online(&self, online: bool) -> Result<Option<ReplayReport>, SyncError> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        tracing::info!(online, was_online, "Sync connectivity changed");
        if online && !was_online {
            return self.replay().await.map(Some);
        }
        Ok(None)
    }

    /// Delivers now, or queues when offline, when older items are still
    /// waiting, or when delivery fails.
    pub async fn submit(&self, op: PendingOperation) -> Result<SubmitOutcome, SyncError> {
        let backlog = self.store.pending_operation_count() > 0;
        if !self.online.load(Ordering::SeqCst) || backlog {
            self.store.enqueue_operation(&op)?;
            return Ok(SubmitOutcome::Queued);
        }

        match self.transport.deliver(&op).await {
            Ok(()) => Ok(SubmitOutcome::Delivered),
            Err(e) => {
                if e.is_connectivity() {
                    self.online.store(false, Ordering::SeqCst);
                }
                tracing::warn!(kind = op.kind.as_str(), error = %e, "Sync delivery failed, queued");
                self.store.enqueue_operation(&op)?;
                Ok(SubmitOutcome::Queued)
            }
        }
    }

    /// One FIFO pass over the queue. Items leave the queue only after the
    /// remote accepts them. A connectivity failure ends the pass; a rejected
    /// item stays queued and the pass moves on.
    pub async fn replay(&self) -> Result<ReplayReport, SyncError> {
        let _guard = self.replay_guard.lock().await;
        let mut report = ReplayReport::default();

        for (key, mut op) in self.store.list_pending_operations()? {
            match self.transport.deliver(&op).await {
                Ok(()) => {
                    self.store.remove_pending_operation(&key)?;
                    self.online.store(true, Ordering::SeqCst);
                    report.delivered += 1;
                }
                Err(e) if e.is_connectivity() => {
                    self.online.store(false, Ordering::SeqCst);
                    tracing::info!(error = %e, "Sync replay paused, remote unreachable");
                    break;
                }
                Err(e) => {
                    op.attempts = op.attempts.saturating_add(1);
                    self.store.update_pending_operation(&key, &op)?;
                    tracing::warn!(
                        key = %key,
                        kind = op.kind.as_str(),
                        attempts = op.attempts,
                        error = %e,
                        "Queued operation rejected, keeping for retry"
                    );
                    report.kept += 1;
                }
            }
        }

        report.remaining = self.store.pending_operation_count();
        if report.delivered > 0 || report.kept > 0 {
            tracing::info!(
                delivered = report.delivered,
                kept = report.kept,
                remaining = report.remaining,
                "Sync replay finished"
            );
        }
        Ok(report)
    }
}

/// Ordered hand-off to a single delivery task. Operations reach
/// `SyncClient::submit` one at a time, in the order they were sent.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<PendingOperation>,
}

impl Outbox {
    /// Must be called inside a tokio runtime. The task ends once every
    /// `Outbox` handle is dropped.
    pub fn spawn(client: Arc<SyncClient>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PendingOperation>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let kind = op.kind;
                if let Err(e) = client.submit(op).await {
                    tracing::warn!(kind = kind.as_str(), error = %e, "Failed to record sync operation");
                }
            }
            tracing::debug!("Sync outbox closed");
        });
        Self { tx }
    }

    pub fn send(&self, op: PendingOperation) {
        if let Err(e) = self.tx.send(op) {
            tracing::warn!(kind = e.0.kind.as_str(), "Sync outbox closed, operation dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::store::operations::sync_queue::OperationKind;

    use super::*;

    /// Transport answering from a scripted list; records delivered payloads.
    #[derive(Default)]
    struct ScriptedTransport {
        script: StdMutex<VecDeque<Result<(), SyncError>>>,
        delivered: StdMutex<Vec<i64>>,
    }

    impl ScriptedTransport {
        fn push(&self, result: Result<(), SyncError>) {
            self.script.lock().unwrap().push_back(result);
        }
    }

    #[axum::async_trait]
    impl RemoteTransport for ScriptedTransport {
        async fn deliver(&self, op: &PendingOperation) -> Result<(), SyncError> {
            let result = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                self.delivered
                    .lock()
                    .unwrap()
                    .push(op.payload["n"].as_i64().unwrap_or(-1));
            }
            result
        }
    }

    fn op(n: i64) -> PendingOperation {
        PendingOperation::new(OperationKind::SaveProgress, json!({ "n": n }), Utc::now())
    }

    fn client(name: &str) -> (tempfile::TempDir, Arc<ScriptedTransport>, SyncClient) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join(name).to_str().unwrap()).unwrap());
        let transport = Arc::new(ScriptedTransport::default());
        let client = SyncClient::new(store, transport.clone());
        (dir, transport, client)
    }

    #[tokio::test]
    async fn network_failure_queues_and_goes_offline() {
        let (_dir, transport, client) = client("sync1");
        transport.push(Err(SyncError::Network("refused".into())));

        assert_eq!(client.submit(op(1)).await.unwrap(), SubmitOutcome::Queued);
        assert_eq!(client.status(), SyncStatus { online: false, pending: 1 });

        assert_eq!(client.submit(op(2)).await.unwrap(), SubmitOutcome::Queued);
        assert_eq!(client.status().pending, 2);
    }

    #[tokio::test]
    async fn reconnect_replays_in_order() {
        let (_dir, transport, client) = client("sync2");
        client.set_online(false).await.unwrap();
        for n in 1..=3 {
            client.submit(op(n)).await.unwrap();
        }

        let report = client.set_online(true).await.unwrap().unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(report.remaining, 0);
        assert_eq!(*transport.delivered.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_item_is_kept_and_pass_continues() {
        let (_dir, transport, client) = client("sync3");
        client.set_online(false).await.unwrap();
        client.submit(op(1)).await.unwrap();
        client.submit(op(2)).await.unwrap();

        transport.push(Err(SyncError::Rejected {
            status: 422,
            message: "bad".into(),
        }));
        transport.push(Ok(()));
        let report = client.replay().await.unwrap();

        assert_eq!(report, ReplayReport { delivered: 1, kept: 1, remaining: 1 });
        let left = client.store.list_pending_operations().unwrap();
        assert_eq!(left[0].1.payload["n"], 1);
        assert_eq!(left[0].1.attempts, 1);
    }

    #[tokio::test]
    async fn connectivity_failure_stops_the_pass() {
        let (_dir, transport, client) = client("sync4");
        client.set_online(false).await.unwrap();
        client.submit(op(1)).await.unwrap();
        client.submit(op(2)).await.unwrap();

        transport.push(Err(SyncError::Offline));
        let report = client.replay().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.remaining, 2);
        assert!(!client.status().online);
    }

    #[tokio::test]
    async fn backlog_keeps_new_items_behind_old_ones() {
        let (_dir, transport, client) = client("sync5");
        transport.push(Err(SyncError::Rejected {
            status: 500,
            message: "oops".into(),
        }));
        client.submit(op(1)).await.unwrap();
        assert!(client.status().online);

        assert_eq!(client.submit(op(2)).await.unwrap(), SubmitOutcome::Queued);
        client.replay().await.unwrap();
        assert_eq!(*transport.delivered.lock().unwrap(), vec![1, 2]);
    }
}
