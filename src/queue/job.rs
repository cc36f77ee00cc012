use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One queue delivery. `attempts` counts failed deliveries so far; it is
/// zero on the first delivery and unchanged by reschedules (staging polls
/// are not failures).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Dedup key, equal to the owning task's queue id
    pub key: String,
    pub task_id: Uuid,
    pub attempts: u32,
}

/// Per-job delivery options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Retry budget for transient failures
    pub max_attempts: u32,
    /// Fixed backoff between retries
    pub backoff: Duration,
    /// Initial delay before the first delivery
    pub delay: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(20),
            delay: None,
        }
    }
}

impl JobOptions {
    pub fn immediate(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Queue-visible lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Ready for the next free worker
    Waiting,
    /// Scheduled for a later delivery
    Delayed,
    /// Currently being executed; not cancellable
    Active,
}

/// What the handler wants done with the job after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// Work finished; remove the entry
    Complete,
    /// Deliver again after `delay` without consuming the retry budget.
    /// Used by staged publishes to re-check media processing.
    Reschedule { delay: Duration },
}

/// Job failure, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Transient failure; redeliver until the retry budget is exhausted
    #[error("retryable: {0}")]
    Retryable(String),

    /// Permanent failure; drop the entry regardless of remaining budget
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Consumer contract for a queue's worker pool. Implementations must
/// convert their domain errors into a [`JobError`]; nothing else escapes
/// a job execution.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn process(&self, job: &Job) -> Result<JobDisposition, JobError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}
