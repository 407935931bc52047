//! Safety-net cleanup task.
//!
//! Release entries are best-effort: a decrement that fails (or an entry lost
//! between increment and enqueue) leaves a counter stale-high. The cleanup
//! task periodically resets the whole store so such leaks heal on their own.
//! It runs on its own ticker, entirely outside the release queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error};

use crate::store::CounterStore;

/// Spawn the periodic full-reset task.
///
/// The first reset fires one full rotation after startup, not immediately.
/// The task stops as soon as the shutdown signal fires, without waiting for
/// a final tick.
pub(crate) fn spawn(
    store: Arc<dyn CounterStore>,
    rotation: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            rotation_ms = rotation.as_millis() as u64,
            "cleanup worker starting"
        );
        let mut ticker = interval_at(Instant::now() + rotation, rotation);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("cleanup rotation firing");
                    if let Err(err) = store.free_all().await {
                        error!(error = %err, "cleanup reset failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("cleanup worker stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_rotation_resets_every_counter() {
        let store = Arc::new(MemoryStore::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        store.increase("a").await.unwrap();
        store.increase("a").await.unwrap();
        store.increase("b").await.unwrap();

        let _task = spawn(store.clone(), Duration::from_secs(60), shutdown_rx);

        // No reset before the first rotation elapses.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(store.get("a").await, 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("a").await, 0);
        assert_eq!(store.get("b").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_fires_repeatedly() {
        let store = Arc::new(MemoryStore::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let _task = spawn(store.clone(), Duration::from_secs(10), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(11)).await;
        store.increase("a").await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.get("a").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_takes_effect_without_a_final_tick() {
        let store = Arc::new(MemoryStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        store.increase("a").await.unwrap();

        let task = spawn(store.clone(), Duration::from_secs(60), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Long after the rotation would have fired, the counter persists.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.get("a").await, 1);
    }
}
