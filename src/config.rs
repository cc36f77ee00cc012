use crate::constants;
use crate::error::{PubflowError, Result};
use std::time::Duration;

/// Engine configuration. Every timing knob and pool size lives here and is
/// passed explicitly to the components that need it at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tasks due within this window at creation are enqueued synchronously.
    pub immediate_publish_threshold_ms: i64,
    /// Interval between scheduler sweeps.
    pub sweep_interval_ms: u64,
    /// Width of the due-task selection window per sweep.
    pub sweep_window_ms: i64,
    /// Retry budget for publish queue jobs (transient failures only).
    pub publish_retry_attempts: u32,
    /// Fixed backoff between publish retries.
    pub publish_retry_backoff_ms: u64,
    /// Per-call timeout for platform requests.
    pub platform_call_timeout_ms: u64,
    /// Staging poll deliveries allowed before a task is force-failed.
    pub staging_cycle_budget: u32,
    /// Delay between staging poll deliveries.
    pub staging_poll_interval_ms: u64,
    /// Worker pool sizes for the three queues.
    pub publish_workers: usize,
    pub distribution_workers: usize,
    pub reply_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            immediate_publish_threshold_ms: constants::IMMEDIATE_PUBLISH_THRESHOLD_MS,
            sweep_interval_ms: constants::SWEEP_INTERVAL_MS,
            sweep_window_ms: constants::SWEEP_WINDOW_MS,
            publish_retry_attempts: constants::PUBLISH_RETRY_ATTEMPTS,
            publish_retry_backoff_ms: constants::PUBLISH_RETRY_BACKOFF_MS,
            platform_call_timeout_ms: constants::PLATFORM_CALL_TIMEOUT_MS,
            staging_cycle_budget: constants::STAGING_CYCLE_BUDGET,
            staging_poll_interval_ms: constants::STAGING_POLL_INTERVAL_MS,
            publish_workers: constants::PUBLISH_WORKERS,
            distribution_workers: constants::DISTRIBUTION_WORKERS,
            reply_workers: constants::REPLY_WORKERS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("PUBFLOW_SWEEP_INTERVAL_MS") {
            config.sweep_interval_ms = interval.parse().map_err(|e| {
                PubflowError::ConfigurationError(format!("Invalid sweep_interval_ms: {e}"))
            })?;
        }

        if let Ok(window) = std::env::var("PUBFLOW_SWEEP_WINDOW_MS") {
            config.sweep_window_ms = window.parse().map_err(|e| {
                PubflowError::ConfigurationError(format!("Invalid sweep_window_ms: {e}"))
            })?;
        }

        if let Ok(workers) = std::env::var("PUBFLOW_PUBLISH_WORKERS") {
            config.publish_workers = workers.parse().map_err(|e| {
                PubflowError::ConfigurationError(format!("Invalid publish_workers: {e}"))
            })?;
        }

        if let Ok(attempts) = std::env::var("PUBFLOW_PUBLISH_RETRY_ATTEMPTS") {
            config.publish_retry_attempts = attempts.parse().map_err(|e| {
                PubflowError::ConfigurationError(format!("Invalid publish_retry_attempts: {e}"))
            })?;
        }

        Ok(config)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn platform_call_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_call_timeout_ms)
    }

    pub fn publish_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_retry_backoff_ms)
    }

    pub fn staging_poll_interval(&self) -> Duration {
        Duration::from_millis(self.staging_poll_interval_ms)
    }
}
