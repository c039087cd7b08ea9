//! Background persistence queue.
//!
//! Every state update becomes exactly one job. A single writer task per store
//! drains jobs in submission order, so the last write to a key wins.

use crate::store::KeyValueStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

enum Job {
    Write {
        key: String,
        value: String,
        ack: oneshot::Sender<bool>,
    },
    Remove {
        key: String,
        ack: oneshot::Sender<bool>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to a store's writer task.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteQueue {
    /// Spawn the writer task for `store`.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Write { key, value, ack } => {
                        let persisted = store.set(&key, &value).await;
                        trace!(%key, bytes = value.len(), persisted, "Write settled");
                        let _ = ack.send(persisted);
                    }
                    Job::Remove { key, ack } => {
                        let removed = store.remove(&key).await;
                        trace!(%key, removed, "Remove settled");
                        let _ = ack.send(removed);
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            trace!("Write queue closed");
        });

        Self { tx }
    }

    /// Queue one write of `value` under `key`.
    pub fn submit(&self, key: &str, value: String) -> PendingWrite {
        let (ack, rx) = oneshot::channel();
        self.enqueue(
            key,
            Job::Write {
                key: key.to_string(),
                value,
                ack,
            },
            rx,
        )
    }

    /// Queue removal of `key`. Settles `true` only if a value was removed.
    pub fn submit_remove(&self, key: &str) -> PendingWrite {
        let (ack, rx) = oneshot::channel();
        self.enqueue(
            key,
            Job::Remove {
                key: key.to_string(),
                ack,
            },
            rx,
        )
    }

    fn enqueue(&self, key: &str, job: Job, rx: oneshot::Receiver<bool>) -> PendingWrite {
        if self.tx.send(job).is_err() {
            warn!(key, "Write queue is closed, dropping job");
            return PendingWrite::settled_with(false);
        }
        PendingWrite {
            state: PendingState::Queued(rx),
        }
    }

    /// Resolve once every previously submitted job has run.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done)).is_ok() {
            let _ = rx.await;
        }
    }
}

enum PendingState {
    Queued(oneshot::Receiver<bool>),
    Settled(bool),
}

/// Outcome of a queued write.
///
/// Dropping it is fine: the write still happens.
pub struct PendingWrite {
    state: PendingState,
}

impl PendingWrite {
    /// A write that was decided without reaching the store.
    pub(crate) fn settled_with(persisted: bool) -> Self {
        Self {
            state: PendingState::Settled(persisted),
        }
    }

    /// Wait for the store's answer. `false` means the value was not persisted.
    pub async fn settled(self) -> bool {
        match self.state {
            PendingState::Settled(persisted) => persisted,
            PendingState::Queued(rx) => rx.await.unwrap_or(false),
        }
    }
}

impl std::fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            PendingState::Queued(_) => "queued",
            PendingState::Settled(true) => "persisted",
            PendingState::Settled(false) => "failed",
        };
        f.debug_tuple("PendingWrite").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn test_writes_apply_in_submission_order() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(store.clone());

        let first = queue.submit("k", "1".to_string());
        let second = queue.submit("k", "2".to_string());
        let third = queue.submit("k", "3".to_string());

        assert!(first.settled().await);
        assert!(second.settled().await);
        assert!(third.settled().await);
        assert_eq!(store.get("k").await, Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_write_settles_false() {
        let store = Arc::new(MemoryStore::with_quota(4));
        let queue = WriteQueue::spawn(store.clone());

        assert!(!queue.submit("key", "too long".to_string()).settled().await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_runs_after_earlier_writes() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(store.clone());

        let _ = queue.submit("k", "1".to_string());
        assert!(queue.submit_remove("k").settled().await);
        assert!(!queue.submit_remove("k").settled().await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_dropped_pending_write_still_persists() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(store.clone());

        drop(queue.submit("k", "v".to_string()));
        queue.flush().await;

        assert_eq!(store.get("k").await, Some("v".to_string()));
    }
}
