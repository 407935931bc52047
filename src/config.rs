//! Configuration for the admission controller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum acceptable release window. Anything at or below this granularity
/// would release admissions faster than the worker pool can meaningfully
/// schedule them.
pub const MIN_WINDOW: Duration = Duration::from_secs(1);

/// Tunable settings for a [`Limiter`](crate::limiter::Limiter).
///
/// Duration-valued settings are integer milliseconds so the struct
/// deserializes from plain YAML. All fields have defaults; a missing field in
/// a config file falls back to its default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum concurrent admitted units per identifier within the window.
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Number of release-queue worker tasks.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Time after which an admitted unit is released, in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Remaining wait below which a release worker skips sleeping,
    /// in milliseconds.
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,

    /// Period of the safety-net full reset, in milliseconds. 0 disables the
    /// cleanup task entirely.
    #[serde(default = "default_cleanup_rotation_ms")]
    pub cleanup_rotation_ms: u64,

    /// How the admission decision treats a counter store failure.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            worker_count: default_worker_count(),
            window_ms: default_window_ms(),
            tolerance_ms: default_tolerance_ms(),
            cleanup_rotation_ms: default_cleanup_rotation_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_limit() -> u64 {
    60
}

fn default_worker_count() -> usize {
    20
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_tolerance_ms() -> u64 {
    2_000
}

fn default_cleanup_rotation_ms() -> u64 {
    86_400_000 // 24 hours
}

/// What the admission decision does when the counter store fails.
///
/// The default is [`FailurePolicy::FailClosed`]: undercounting risks
/// unbounded concurrency, so an unreachable store denies. Every occurrence
/// is logged either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat a store failure as "over limit" and deny.
    #[default]
    FailClosed,
    /// Treat a store failure as "not over limit" and admit. The admission is
    /// not enqueued for release, since no counter was incremented.
    FailOpen,
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Unreadable(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Unreadable(e.to_string()))
    }

    /// The release window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// The sleep-skip tolerance as a [`Duration`].
    pub fn tolerance(&self) -> Duration {
        Duration::from_millis(self.tolerance_ms)
    }

    /// The cleanup rotation as a [`Duration`], or `None` when disabled.
    pub fn cleanup_rotation(&self) -> Option<Duration> {
        if self.cleanup_rotation_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.cleanup_rotation_ms))
        }
    }

    /// Check every numeric constraint, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkerCount);
        }
        if self.window() <= MIN_WINDOW {
            return Err(ConfigError::WindowTooShort(self.window(), MIN_WINDOW));
        }
        if self.tolerance() >= self.window() {
            return Err(ConfigError::ToleranceTooLarge {
                tolerance: self.tolerance(),
                window: self.window(),
            });
        }
        if let Some(rotation) = self.cleanup_rotation() {
            if rotation <= self.window() {
                return Err(ConfigError::CleanupRotationTooShort {
                    rotation,
                    window: self.window(),
                });
            }
        }
        Ok(())
    }
}
