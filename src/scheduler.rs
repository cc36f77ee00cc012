//! # Scheduler
//!
//! Periodic sweep that finds due publish tasks and hands each to the
//! dispatch queue. Sweeps are single-flight: an overlapping run is skipped
//! outright so the same due task is never enqueued twice by the sweep
//! itself. Queue-level key dedup is the second line of defense.

use crate::config::Config;
use crate::error::Result;
use crate::queue::{DispatchQueue, EnqueueOutcome, JobOptions};
use crate::store::TaskStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    queue: Arc<DispatchQueue>,
    config: Config,
    sweep_gate: Mutex<()>,
    shutdown: Notify,
    shutting_down: AtomicBool,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<DispatchQueue>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            config,
            sweep_gate: Mutex::new(()),
            shutdown: Notify::new(),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Run the sweep loop until [`Scheduler::shutdown`] is called.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        info!(
            interval_ms = scheduler.config.sweep_interval_ms,
            window_ms = scheduler.config.sweep_window_ms,
            "starting scheduler sweep loop"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if scheduler.shutting_down.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Err(e) = scheduler.sweep_once().await {
                            error!(error = %e, "scheduler sweep failed");
                        }
                    }
                    _ = scheduler.shutdown.notified() => break,
                }
            }
            debug!("scheduler sweep loop stopped");
        })
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// One sweep pass. Returns the number of tasks handed to the queue, or
    /// `None`-equivalent zero when another sweep already holds the gate.
    pub async fn sweep_once(&self) -> Result<usize> {
        let Ok(_gate) = self.sweep_gate.try_lock() else {
            warn!("sweep already in flight, skipping this run");
            return Ok(0);
        };

        let now = Utc::now();
        // Reach one window back so a task missed by a late or failed sweep
        // is still picked up; the queue key dedup absorbs any overlap.
        let start = now - ChronoDuration::milliseconds(self.config.sweep_window_ms);
        let end = now + ChronoDuration::milliseconds(self.config.sweep_window_ms);

        let due = self.store.due_publish_tasks(start, end).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "sweep found due tasks");

        let mut enqueued = 0;
        for task in due {
            let delay_ms = (task.publish_time - now).num_milliseconds().max(0);
            let mut opts = JobOptions::immediate(
                self.config.publish_retry_attempts,
                self.config.publish_retry_backoff(),
            );
            if delay_ms > 0 {
                opts = opts.with_delay(Duration::from_millis(delay_ms as u64));
            }

            match self.queue.enqueue(&task.queue_id, task.id, opts) {
                EnqueueOutcome::Enqueued => {
                    self.store.set_in_queue(task.id, true).await?;
                    debug!(
                        task_id = %task.id,
                        platform = %task.platform,
                        delay_ms,
                        "sweep enqueued task"
                    );
                    enqueued += 1;
                }
                EnqueueOutcome::Duplicate => {
                    debug!(task_id = %task.id, "task already queued, sweep skipped it");
                }
            }
        }

        if enqueued > 0 {
            info!(enqueued, "sweep pass complete");
        }
        Ok(enqueued)
    }
}
