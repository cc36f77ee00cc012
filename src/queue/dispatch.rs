use super::job::{Job, JobDisposition, JobError, JobHandler, JobOptions, JobState};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fallback poll interval while idle with no delayed entries pending.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// An entry with the same key is already outstanding; the new request
    /// was refused (at most one queue entry per task).
    Duplicate,
}

/// Result of a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// No entry with that key; deleting nothing is a no-op, not an error
    NotFound,
    /// Entry is being executed; the caller must wait for it to settle
    Active,
}

struct Entry {
    job: Job,
    opts: JobOptions,
    state: JobState,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    ready: VecDeque<String>,
    /// Delayed entries keyed by (due-ms, seq) for stable ordering
    delayed: BTreeMap<(i64, u64), String>,
}

impl Inner {
    /// Move delayed entries whose due time has arrived into the ready
    /// queue.
    fn promote_due(&mut self, now_ms: i64) {
        let due_keys: Vec<(i64, u64)> = self
            .delayed
            .range(..=(now_ms, u64::MAX))
            .map(|(k, _)| *k)
            .collect();
        for slot in due_keys {
            if let Some(key) = self.delayed.remove(&slot) {
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.state = JobState::Waiting;
                    self.ready.push_back(key);
                }
            }
        }
    }

    fn next_delayed_due(&self) -> Option<i64> {
        self.delayed.keys().next().map(|(due, _)| *due)
    }

    fn remove_from_delayed(&mut self, key: &str) {
        let slot = self
            .delayed
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .map(|(slot, _)| *slot);
        if let Some(slot) = slot {
            self.delayed.remove(&slot);
        }
    }
}

/// Keyed, at-least-once, in-process job queue with delayed entries and a
/// bounded worker pool.
pub struct DispatchQueue {
    name: String,
    inner: Mutex<Inner>,
    notify: Notify,
    shutdown: Notify,
    shutting_down: AtomicBool,
    seq: AtomicU64,
}

impl DispatchQueue {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            shutdown: Notify::new(),
            shutting_down: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a job unless an entry with the same key is already outstanding.
    pub fn enqueue(&self, key: &str, task_id: Uuid, opts: JobOptions) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(key) {
            debug!(queue = %self.name, key = %key, "enqueue refused, duplicate key");
            return EnqueueOutcome::Duplicate;
        }

        let job = Job {
            key: key.to_string(),
            task_id,
            attempts: 0,
        };
        let state = match opts.delay {
            Some(delay) => {
                let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                let slot = (due, self.seq.fetch_add(1, Ordering::Relaxed));
                inner.delayed.insert(slot, key.to_string());
                JobState::Delayed
            }
            None => {
                inner.ready.push_back(key.to_string());
                JobState::Waiting
            }
        };
        inner.entries.insert(key.to_string(), Entry { job, opts, state });
        drop(inner);

        self.notify.notify_one();
        EnqueueOutcome::Enqueued
    }

    pub fn job_state(&self, key: &str) -> Option<JobState> {
        self.inner.lock().entries.get(key).map(|e| e.state)
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Cancel an entry that has not started executing. An active entry is
    /// left in place and reported as such.
    pub fn cancel_if_pending(&self, key: &str) -> CancelOutcome {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).map(|e| e.state) {
            None => CancelOutcome::NotFound,
            Some(JobState::Active) => CancelOutcome::Active,
            Some(JobState::Waiting) => {
                inner.entries.remove(key);
                inner.ready.retain(|k| k != key);
                CancelOutcome::Cancelled
            }
            Some(JobState::Delayed) => {
                inner.entries.remove(key);
                inner.remove_from_delayed(key);
                CancelOutcome::Cancelled
            }
        }
    }

    /// Spawn `workers` consumer tasks for this queue. Each worker pulls
    /// one job at a time, so pool size bounds concurrency.
    pub fn start(
        self: &Arc<Self>,
        handler: Arc<dyn JobHandler>,
        workers: usize,
    ) -> Vec<JoinHandle<()>> {
        info!(queue = %self.name, workers, handler = handler.name(), "starting queue workers");
        (0..workers)
            .map(|worker_id| {
                let queue = Arc::clone(self);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { queue.run_worker(handler, worker_id).await })
            })
            .collect()
    }

    /// Signal all workers to stop after their current job settles.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        self.notify.notify_waiters();
    }

    async fn run_worker(self: Arc<Self>, handler: Arc<dyn JobHandler>, worker_id: usize) {
        debug!(queue = %self.name, worker_id, "worker started");
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            match self.checkout_next() {
                Some(job) => {
                    debug!(
                        queue = %self.name,
                        worker_id,
                        key = %job.key,
                        task_id = %job.task_id,
                        attempts = job.attempts,
                        "processing job"
                    );
                    let result = handler.process(&job).await;
                    self.settle(&job.key, result);
                }
                None => {
                    let wait = self.time_until_next_delayed().unwrap_or(IDLE_POLL);
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.shutdown.notified() => break,
                    }
                }
            }
        }
        debug!(queue = %self.name, worker_id, "worker stopped");
    }

    /// Pop the next due job and mark it active. Lock is released before
    /// any await.
    fn checkout_next(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        inner.promote_due(Utc::now().timestamp_millis());
        while let Some(key) = inner.ready.pop_front() {
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.state = JobState::Active;
                return Some(entry.job.clone());
            }
            // Entry was cancelled while queued; skip the stale key.
        }
        None
    }

    fn time_until_next_delayed(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.next_delayed_due().map(|due| {
            let delta = due - Utc::now().timestamp_millis();
            Duration::from_millis(delta.max(0) as u64)
        })
    }

    /// Apply the handler's verdict to an active entry.
    fn settle(&self, key: &str, result: Result<JobDisposition, JobError>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(key) else {
            warn!(queue = %self.name, key = %key, "settle for unknown entry");
            return;
        };

        match result {
            Ok(JobDisposition::Complete) => {
                inner.entries.remove(key);
            }
            Ok(JobDisposition::Reschedule { delay }) => {
                // Not a failure: the retry budget is untouched.
                entry.state = JobState::Delayed;
                let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                let slot = (due, self.seq.fetch_add(1, Ordering::Relaxed));
                inner.delayed.insert(slot, key.to_string());
            }
            Err(JobError::Fatal(message)) => {
                warn!(queue = %self.name, key = %key, %message, "job failed permanently, dropping");
                inner.entries.remove(key);
            }
            Err(JobError::Retryable(message)) => {
                entry.job.attempts += 1;
                if entry.job.attempts >= entry.opts.max_attempts {
                    warn!(
                        queue = %self.name,
                        key = %key,
                        attempts = entry.job.attempts,
                        %message,
                        "retry budget exhausted, dropping job"
                    );
                    inner.entries.remove(key);
                } else {
                    debug!(queue = %self.name, key = %key, attempts = entry.job.attempts, %message, "job failed, retrying");
                    entry.state = JobState::Delayed;
                    let due =
                        Utc::now().timestamp_millis() + entry.opts.backoff.as_millis() as i64;
                    let slot = (due, self.seq.fetch_add(1, Ordering::Relaxed));
                    inner.delayed.insert(slot, key.to_string());
                }
            }
        }
        drop(guard);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedHandler {
        calls: AtomicUsize,
        script: Box<dyn Fn(usize) -> Result<JobDisposition, JobError> + Send + Sync>,
    }

    impl ScriptedHandler {
        fn new(
            script: impl Fn(usize) -> Result<JobDisposition, JobError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn process(&self, _job: &Job) -> Result<JobDisposition, JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    fn quick_opts(max_attempts: u32) -> JobOptions {
        JobOptions {
            max_attempts,
            backoff: Duration::from_millis(10),
            delay: None,
        }
    }

    #[tokio::test]
    async fn test_enqueue_dedups_on_key() {
        let queue = DispatchQueue::new("test");
        let id = Uuid::new_v4();
        assert_eq!(
            queue.enqueue("k1", id, quick_opts(3)),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            queue.enqueue("k1", id, quick_opts(3)),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_and_missing() {
        let queue = DispatchQueue::new("test");
        queue.enqueue("k1", Uuid::new_v4(), quick_opts(3));
        assert_eq!(queue.cancel_if_pending("k1"), CancelOutcome::Cancelled);
        assert_eq!(queue.cancel_if_pending("k1"), CancelOutcome::NotFound);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_cancel_delayed_entry() {
        let queue = DispatchQueue::new("test");
        queue.enqueue(
            "k1",
            Uuid::new_v4(),
            quick_opts(3).with_delay(Duration::from_secs(60)),
        );
        assert_eq!(queue.job_state("k1"), Some(JobState::Delayed));
        assert_eq!(queue.cancel_if_pending("k1"), CancelOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_active_entry_not_cancellable() {
        let queue = DispatchQueue::new("test");
        // Handler that parks long enough for the cancel attempt.
        struct Slow;
        #[async_trait]
        impl JobHandler for Slow {
            async fn process(&self, _job: &Job) -> Result<JobDisposition, JobError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(JobDisposition::Complete)
            }
            fn name(&self) -> &'static str {
                "slow"
            }
        }
        let handles = queue.start(Arc::new(Slow), 1);

        queue.enqueue("k1", Uuid::new_v4(), quick_opts(3));
        assert!(wait_until(500, || queue.job_state("k1") == Some(JobState::Active)).await);
        assert_eq!(queue.cancel_if_pending("k1"), CancelOutcome::Active);

        assert!(wait_until(1000, || queue.outstanding() == 0).await);
        queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_transient_failures_respect_retry_budget() {
        let queue = DispatchQueue::new("test");
        let handler = ScriptedHandler::new(|_| Err(JobError::Retryable("flaky".to_string())));
        let handles = queue.start(handler.clone(), 1);

        queue.enqueue("k1", Uuid::new_v4(), quick_opts(3));
        assert!(wait_until(2000, || queue.outstanding() == 0).await);
        assert_eq!(handler.calls(), 3);

        queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let queue = DispatchQueue::new("test");
        let handler = ScriptedHandler::new(|_| Err(JobError::Fatal("rejected".to_string())));
        let handles = queue.start(handler.clone(), 1);

        queue.enqueue("k1", Uuid::new_v4(), quick_opts(5));
        assert!(wait_until(1000, || queue.outstanding() == 0).await);
        assert_eq!(handler.calls(), 1);

        queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_reschedule_does_not_consume_retry_budget() {
        let queue = DispatchQueue::new("test");
        // Two staging polls, then done. max_attempts of 1 proves the
        // reschedules never touch the retry budget.
        let handler = ScriptedHandler::new(|call| {
            if call < 2 {
                Ok(JobDisposition::Reschedule {
                    delay: Duration::from_millis(10),
                })
            } else {
                Ok(JobDisposition::Complete)
            }
        });
        let handles = queue.start(handler.clone(), 1);

        queue.enqueue("k1", Uuid::new_v4(), quick_opts(1));
        assert!(wait_until(2000, || queue.outstanding() == 0).await);
        assert_eq!(handler.calls(), 3);

        queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_delayed_entry_waits_for_due_time() {
        let queue = DispatchQueue::new("test");
        let handler = ScriptedHandler::new(|_| Ok(JobDisposition::Complete));
        let handles = queue.start(handler.clone(), 1);

        queue.enqueue(
            "k1",
            Uuid::new_v4(),
            quick_opts(3).with_delay(Duration::from_millis(100)),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handler.calls(), 0);

        assert!(wait_until(1000, || handler.calls() == 1).await);
        queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
