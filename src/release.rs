//! Release queue consumers.
//!
//! Every successful admission enqueues a [`ReleaseEntry`]; a fixed pool of
//! workers drains the queue, waits out each entry's remaining window, and
//! returns the capacity with a counter decrement. Entries are dequeued in
//! FIFO order but may finish out of order, since each worker sleeps
//! independently. The guarantee is eventual release within the window plus
//! scheduling slack, not release ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::store::CounterStore;

/// One admitted unit of work and the moment its counter contribution is due
/// back. Lives only in the in-memory queue, consumed exactly once.
#[derive(Debug)]
pub(crate) struct ReleaseEntry {
    pub identifier: String,
    pub release_at: Instant,
}

/// Shared tail of the release queue.
pub(crate) type ReleaseQueue = Arc<Mutex<UnboundedReceiver<ReleaseEntry>>>;

/// Spawn the worker pool. The pool size is fixed for the lifetime of the
/// limiter; workers exit when the queue closes or the shutdown signal fires.
pub(crate) fn spawn_workers(
    count: usize,
    queue: ReleaseQueue,
    store: Arc<dyn CounterStore>,
    tolerance: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            tokio::spawn(run_worker(
                worker_id,
                queue.clone(),
                store.clone(),
                tolerance,
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    queue: ReleaseQueue,
    store: Arc<dyn CounterStore>,
    tolerance: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "release worker starting");

    loop {
        // The queue lock is held only across the dequeue, never while
        // sleeping, so an idle worker can pick up the next entry while this
        // one waits out its release time.
        let entry = tokio::select! {
            _ = shutdown.changed() => break,
            entry = async { queue.lock().await.recv().await } => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        let remaining = entry.release_at.saturating_duration_since(Instant::now());
        if remaining >= tolerance {
            debug!(
                worker_id,
                id = %entry.identifier,
                wait_ms = remaining.as_millis() as u64,
                "waiting for release time"
            );
            tokio::select! {
                _ = tokio::time::sleep_until(entry.release_at) => {}
                _ = shutdown.changed() => {
                    debug!(worker_id, "shutdown during release wait");
                    break;
                }
            }
        }

        debug!(worker_id, id = %entry.identifier, "releasing entry");
        if let Err(error) = store.decrease(&entry.identifier).await {
            // Leaves the counter stale-high; the cleanup rotation reconciles.
            warn!(worker_id, id = %entry.identifier, %error, "release decrement failed");
        }
    }

    debug!(worker_id, "release worker stopped");
}
