//! Error types for the turnstile admission controller.

use std::time::Duration;

use thiserror::Error;

/// Errors detected while validating a limiter configuration.
///
/// All of these are reported by [`Limiter::build`](crate::limiter::Limiter::build)
/// before any worker task is started.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The admission limit was zero.
    #[error("limit must be greater than 0")]
    ZeroLimit,

    /// The release worker count was zero.
    #[error("worker count must be greater than 0")]
    ZeroWorkerCount,

    /// The release window was at or below the minimum granularity.
    #[error("window ({0:?}) must be greater than {1:?}")]
    WindowTooShort(Duration, Duration),

    /// The sleep-skip tolerance was at or above the window.
    #[error("tolerance ({tolerance:?}) must be less than the window ({window:?})")]
    ToleranceTooLarge {
        /// Configured tolerance.
        tolerance: Duration,
        /// Configured window.
        window: Duration,
    },

    /// The cleanup rotation was non-zero but not greater than the window.
    #[error("cleanup rotation ({rotation:?}) must be 0 (disabled) or greater than the window ({window:?})")]
    CleanupRotationTooShort {
        /// Configured rotation.
        rotation: Duration,
        /// Configured window.
        window: Duration,
    },

    /// No identifier selector was provided.
    #[error("an id selector is required")]
    MissingIdSelector,

    /// No denial handler was provided.
    #[error("a denial handler is required")]
    MissingDenialHandler,

    /// No counter store was provided.
    #[error("a counter store is required")]
    MissingStore,

    /// A settings file could not be read or parsed.
    #[error("unreadable settings: {0}")]
    Unreadable(String),
}

/// Errors raised by a counter store backend at runtime.
///
/// Store failures never crash the admitting path: the admission decision
/// applies the configured [`FailurePolicy`](crate::config::FailurePolicy),
/// release workers log and move on, and the cleanup rotation restores
/// correctness for any counter left stale-high.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The shared store could not be reached or rejected a command.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
