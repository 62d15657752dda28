//! Timer-driven background workers.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::sync_queue::SyncQueue;

/// Cancelable handle to a running background worker.
///
/// Dropping the handle also signals shutdown; [`WorkerHandle::stop`] waits
/// for the worker to finish its current step.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(name: &'static str, shutdown: Arc<Notify>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal shutdown and wait for the worker task to end.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                tracing::error!(worker = self.name, error = %err, "background worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Flushes the pending-write queue once at start and then every
/// [`SyncQueue::interval`], while sync is enabled.
pub struct SyncWorker {
    queue: SyncQueue,
}

impl SyncWorker {
    pub fn new(queue: SyncQueue) -> Self {
        Self { queue }
    }

    pub fn start(self) -> WorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let queue = self.queue;

        let join = tokio::spawn(async move {
            tracing::info!("sync worker started");
            loop {
                if queue.is_enabled() {
                    let outcome = queue.flush().await;
                    tracing::debug!(?outcome, "scheduled flush finished");
                } else {
                    tracing::debug!("sync disabled, skipping scheduled flush");
                }

                // Re-read every round so interval changes apply without a restart.
                let wait = queue.interval();
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            tracing::info!("sync worker stopped");
        });

        WorkerHandle::new("sync", shutdown, join)
    }
}
