//! # System Constants
//!
//! Core constants and queue identifiers that define the operational
//! boundaries of the publish/engagement orchestration engine.

/// Queue names for the three independent dispatch queues. Each queue gets
/// its own bounded worker pool so a slow platform cannot starve the others.
pub mod queues {
    pub const POST_PUBLISH: &str = "post_publish";
    pub const ENGAGEMENT_DISTRIBUTION: &str = "engagement_task_distribution";
    pub const ENGAGEMENT_REPLY: &str = "engagement_reply_to_comment_task";
}

/// Tasks whose target time is within this threshold at creation are
/// enqueued synchronously instead of waiting for the next sweep.
pub const IMMEDIATE_PUBLISH_THRESHOLD_MS: i64 = 90_000;

/// How often the scheduler sweeps for due tasks.
pub const SWEEP_INTERVAL_MS: u64 = 60_000;

/// Upper bound of the sweep selection window. Must exceed the sweep
/// interval so no task falls between two consecutive windows.
pub const SWEEP_WINDOW_MS: i64 = 120_000;

/// Default retry budget for publish queue jobs.
pub const PUBLISH_RETRY_ATTEMPTS: u32 = 3;

/// Fixed backoff between publish retries.
pub const PUBLISH_RETRY_BACKOFF_MS: u64 = 20_000;

/// Request timeout for a single platform call.
pub const PLATFORM_CALL_TIMEOUT_MS: u64 = 30_000;

/// Number of staging poll deliveries a task may consume before it is
/// forced into a failed state with a partial-completion diagnostic.
pub const STAGING_CYCLE_BUDGET: u32 = 30;

/// Delay between staging poll deliveries for a task whose media is still
/// processing.
pub const STAGING_POLL_INTERVAL_MS: u64 = 15_000;

/// Worker pool sizes per queue.
pub const PUBLISH_WORKERS: usize = 5;
pub const DISTRIBUTION_WORKERS: usize = 3;
pub const REPLY_WORKERS: usize = 3;
