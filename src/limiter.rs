//! Admission decisions and limiter lifecycle.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cleanup;
use crate::config::{FailurePolicy, Settings};
use crate::error::ConfigError;
use crate::release::{self, ReleaseEntry};
use crate::store::CounterStore;

/// Maps a request-like context to the identifier its admissions are counted
/// under. Uniqueness and collision behavior of the identifier are the
/// caller's responsibility; the empty string is a valid identifier.
pub type IdSelector<R> = Box<dyn Fn(&R) -> String + Send + Sync>;

/// Invoked on every denial to produce the externally visible rejection
/// (status code, log line, whatever the transport needs).
pub type DenialHandler<R> = Box<dyn Fn(&R) + Send + Sync>;

/// Everything needed to build a [`Limiter`] over request type `R`.
///
/// A plain options value: fill in the fields and hand it to
/// [`Limiter::build`]. The three hook fields have no usable default for an
/// arbitrary request type and must be set; [`Default`] leaves them `None`.
pub struct LimiterOptions<R> {
    /// Numeric settings, see [`Settings`].
    pub settings: Settings,
    /// Required identifier selector.
    pub id_selector: Option<IdSelector<R>>,
    /// Required denial handler.
    pub denial_handler: Option<DenialHandler<R>>,
    /// Required counter store backend.
    pub store: Option<Arc<dyn CounterStore>>,
}

impl<R> Default for LimiterOptions<R> {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            id_selector: None,
            denial_handler: None,
            store: None,
        }
    }
}

/// Concurrency admission controller.
///
/// Tracks how many units of work each identifier has outstanding and denies
/// new ones past the configured limit. Admitted units are returned to the
/// identifier's budget by the release worker pool once the window elapses.
///
/// All state is owned by the instance; independent limiters do not
/// interfere with each other.
pub struct Limiter<R> {
    settings: Settings,
    id_selector: IdSelector<R>,
    denial_handler: DenialHandler<R>,
    store: Arc<dyn CounterStore>,
    queue_tx: UnboundedSender<ReleaseEntry>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    cleanup: Option<JoinHandle<()>>,
}

impl<R> Limiter<R> {
    /// Validate `options` and start the limiter.
    ///
    /// Every configuration problem is reported here, before any task is
    /// spawned. On success the release workers (and the cleanup task, unless
    /// its rotation is disabled) are already running. Must be called within
    /// a tokio runtime.
    pub fn build(options: LimiterOptions<R>) -> Result<Self, ConfigError> {
        options.settings.validate()?;
        let id_selector = options.id_selector.ok_or(ConfigError::MissingIdSelector)?;
        let denial_handler = options
            .denial_handler
            .ok_or(ConfigError::MissingDenialHandler)?;
        let store = options.store.ok_or(ConfigError::MissingStore)?;
        let settings = options.settings;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = release::spawn_workers(
            settings.worker_count,
            Arc::new(Mutex::new(queue_rx)),
            store.clone(),
            settings.tolerance(),
            shutdown_rx.clone(),
        );

        let cleanup = settings
            .cleanup_rotation()
            .map(|rotation| cleanup::spawn(store.clone(), rotation, shutdown_rx));

        info!(
            limit = settings.limit,
            workers = settings.worker_count,
            window_ms = settings.window_ms,
            cleanup = cleanup.is_some(),
            "limiter started"
        );

        Ok(Self {
            settings,
            id_selector,
            denial_handler,
            store,
            queue_tx,
            shutdown_tx,
            workers,
            cleanup,
        })
    }

    /// Decide whether one unit of work may proceed.
    ///
    /// On admit, the identifier's counter has been incremented and a release
    /// entry for `now + window` is queued. On deny, nothing was mutated and
    /// the denial handler has been invoked. The check-and-increment is
    /// atomic: concurrent admissions for one identifier never push its count
    /// past the limit.
    pub async fn admit(&self, request: &R) -> bool {
        let id = (self.id_selector)(request);

        match self.store.try_acquire(&id, self.settings.limit).await {
            Ok(true) => {
                debug!(id = %id, "admitted");
                let entry = ReleaseEntry {
                    identifier: id,
                    release_at: Instant::now() + self.settings.window(),
                };
                if self.queue_tx.send(entry).is_err() {
                    // Queue already closed by shutdown; the cleanup rotation
                    // reclaims the counter.
                    warn!("release queue closed, entry will not be auto-released");
                }
                true
            }
            Ok(false) => {
                debug!(id = %id, limit = self.settings.limit, "denied, over limit");
                (self.denial_handler)(request);
                false
            }
            Err(error) => match self.settings.failure_policy {
                FailurePolicy::FailClosed => {
                    warn!(id = %id, %error, "counter store failed, denying");
                    (self.denial_handler)(request);
                    false
                }
                FailurePolicy::FailOpen => {
                    // Nothing was incremented, so nothing is enqueued either.
                    warn!(id = %id, %error, "counter store failed, admitting");
                    true
                }
            },
        }
    }

    /// The counter store this limiter runs against.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// The validated settings this limiter was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stop the limiter: signal every task, close the queue, and wait for
    /// the workers and the cleanup task to finish.
    ///
    /// Entries still waiting out their window are abandoned; their counters
    /// are reclaimed by the store's TTL or the next process's cleanup
    /// rotation. Dropping the limiter without calling this also terminates
    /// the tasks, just without joining them.
    pub async fn shutdown(self) {
        info!("limiter shutting down");
        let _ = self.shutdown_tx.send(true);
        drop(self.queue_tx);

        join_all(self.workers).await;
        if let Some(task) = self.cleanup {
            let _ = task.await;
        }
        info!("limiter stopped");
    }
}

impl<R> std::fmt::Debug for Limiter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("settings", &self.settings)
            .field("workers", &self.workers.len())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}
