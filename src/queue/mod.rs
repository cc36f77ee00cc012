//! # Dispatch Queue
//!
//! At-least-once job delivery keyed by task identity, decoupling "task
//! became due" from "task executes". Each queue owns a bounded worker
//! pool; publish dispatch, engagement distribution and reply posting run
//! on three independent queues so a slow platform cannot starve the
//! others.
//!
//! Dedup: a job's key equals the task's dedup key, generated once at task
//! creation. Re-enqueuing an existing key is detected and refused, and a
//! pending entry can be cancelled before a task's timing is changed. An
//! entry already being executed is not cancellable; the caller is told to
//! wait.

mod dispatch;
mod job;

pub use dispatch::{CancelOutcome, DispatchQueue, EnqueueOutcome};
pub use job::{Job, JobDisposition, JobError, JobHandler, JobOptions, JobState};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {0} is being executed and cannot be cancelled; wait for it to settle")]
    ActiveJob(String),
}
