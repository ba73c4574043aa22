//! Ordered fire-and-forget writes.
//!
//! Callers enqueue writes without waiting for them; a single worker task
//! applies them in FIFO order, so for any key the last write enqueued is the
//! last write applied. Backends may block (the file backend takes a file
//! lock), so each write runs on the blocking pool.

use crate::SessionStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A queued store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Set { key: String, value: String },
    Remove { key: String },
}

enum Command {
    Write(StoreWrite),
    Flush(oneshot::Sender<()>),
}

/// Sender side of the write queue. Cheap to clone.
#[derive(Clone)]
pub struct PersistQueue {
    sender: mpsc::UnboundedSender<Command>,
}

impl PersistQueue {
    /// Start the worker on the current tokio runtime.
    ///
    /// The worker exits once every `PersistQueue` clone has been dropped and
    /// the remaining writes have been applied.
    pub fn start(store: Arc<SessionStore>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();

        let handle = tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Write(write) => {
                        let store = store.clone();
                        let applied = tokio::task::spawn_blocking(move || apply(&store, write));
                        if let Err(e) = applied.await {
                            warn!(error = %e, "Persist write task failed");
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persist queue drained, worker exiting");
        });

        (Self { sender }, handle)
    }

    /// Enqueue a write. Never blocks; a stopped worker is logged.
    pub fn enqueue(&self, write: StoreWrite) {
        if self.sender.send(Command::Write(write)).is_err() {
            warn!("Persist queue worker stopped, dropping write");
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.enqueue(StoreWrite::Set {
            key: key.to_string(),
            value: value.into(),
        });
    }

    pub fn remove(&self, key: &str) {
        self.enqueue(StoreWrite::Remove {
            key: key.to_string(),
        });
    }

    /// Wait until every write enqueued before this call has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}

fn apply(store: &SessionStore, write: StoreWrite) {
    // Failures are already logged by the store; there is no retry.
    match write {
        StoreWrite::Set { key, value } => {
            store.set(&key, &value);
        }
        StoreWrite::Remove { key } => {
            store.remove(&key);
        }
    }
}
