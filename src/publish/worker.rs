use super::PublishRecordSink;
use crate::adapters::{AdapterRegistry, AuthStatus, ExecuteOutcome};
use crate::config::Config;
use crate::error::PubflowError;
use crate::models::{PublishStatus, PublishTask};
use crate::notifications::{Notification, NotificationHub};
use crate::queue::{Job, JobDisposition, JobError, JobHandler};
use crate::staging;
use crate::state_machine::PublishStateMachine;
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Store failures inside a job are infrastructure failures: the job is
/// redelivered, which is safe because every status write is a CAS.
fn infra(e: PubflowError) -> JobError {
    JobError::Retryable(format!("store failure: {e}"))
}

/// The publish worker. One delivery: load the task, no-op if it is no
/// longer dispatchable, move it to `Publishing`, run the adapter under
/// the platform call timeout and persist whatever came back.
pub struct PublishJobHandler {
    store: Arc<dyn TaskStore>,
    registry: Arc<AdapterRegistry>,
    machine: PublishStateMachine,
    records: Arc<dyn PublishRecordSink>,
    hub: NotificationHub,
    config: Config,
}

impl PublishJobHandler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<AdapterRegistry>,
        records: Arc<dyn PublishRecordSink>,
        hub: NotificationHub,
        config: Config,
    ) -> Self {
        let machine = PublishStateMachine::new(store.clone());
        Self {
            store,
            registry,
            machine,
            records,
            hub,
            config,
        }
    }

    async fn apply_outcome(
        &self,
        job: &Job,
        task: &PublishTask,
        outcome: ExecuteOutcome,
    ) -> Result<JobDisposition, JobError> {
        match outcome.status {
            PublishStatus::Published => {
                let platform_item_id = outcome
                    .platform_item_id
                    .as_deref()
                    .or(task.platform_item_id.as_deref());
                if platform_item_id.is_none() {
                    warn!(task_id = %task.id, "published without a platform item id");
                }

                let applied = self
                    .machine
                    .complete(task.id, platform_item_id, outcome.work_link.as_deref())
                    .await
                    .map_err(infra)?;
                self.store.set_in_queue(task.id, false).await.map_err(infra)?;

                if applied.was_applied() {
                    self.hub
                        .notify(Notification::PublishStatusChanged {
                            task_id: task.id,
                            platform: task.platform,
                            status: PublishStatus::Published,
                        })
                        .await;
                    self.record_terminal(task.id, true).await;
                }
                Ok(JobDisposition::Complete)
            }
            PublishStatus::Publishing => {
                let cycles = self
                    .store
                    .increment_staging_cycles(task.id)
                    .await
                    .map_err(infra)?;
                if cycles >= self.config.staging_cycle_budget {
                    let summary = staging::progress_summary(self.store.as_ref(), task.id)
                        .await
                        .unwrap_or_else(|e| e.to_string());
                    let message = format!(
                        "media staging did not settle within {cycles} poll cycles; {summary}"
                    );
                    return self.permanent_failure(task, &message).await;
                }

                debug!(
                    task_id = %task.id,
                    cycles,
                    "media still processing, rescheduling poll"
                );
                Ok(JobDisposition::Reschedule {
                    delay: self.config.staging_poll_interval(),
                })
            }
            PublishStatus::Failed if outcome.no_retry => {
                self.permanent_failure(task, &outcome.message).await
            }
            PublishStatus::Failed => self.transient_failure(job, task, &outcome.message).await,
            PublishStatus::WaitingForPublish => {
                self.transient_failure(job, task, "adapter returned a waiting status")
                    .await
            }
        }
    }

    /// Terminal failure: persist `Failed` (first terminal write wins) and
    /// drop the queue entry.
    async fn permanent_failure(
        &self,
        task: &PublishTask,
        message: &str,
    ) -> Result<JobDisposition, JobError> {
        let applied = self.machine.fail(task.id, message).await.map_err(infra)?;
        self.store.set_in_queue(task.id, false).await.map_err(infra)?;
        if applied.was_applied() {
            self.hub
                .notify(Notification::PublishStatusChanged {
                    task_id: task.id,
                    platform: task.platform,
                    status: PublishStatus::Failed,
                })
                .await;
            self.record_terminal(task.id, false).await;
        }
        Err(JobError::Fatal(message.to_string()))
    }

    /// Transient failure: leave the task non-terminal while retry budget
    /// remains; the exhausting attempt ends it as `Failed`.
    async fn transient_failure(
        &self,
        job: &Job,
        task: &PublishTask,
        message: &str,
    ) -> Result<JobDisposition, JobError> {
        let final_attempt = job.attempts + 1 >= self.config.publish_retry_attempts;
        if final_attempt {
            let applied = self.machine.fail(task.id, message).await.map_err(infra)?;
            self.store.set_in_queue(task.id, false).await.map_err(infra)?;
            if applied.was_applied() {
                self.hub
                    .notify(Notification::PublishStatusChanged {
                        task_id: task.id,
                        platform: task.platform,
                        status: PublishStatus::Failed,
                    })
                    .await;
                self.record_terminal(task.id, false).await;
            }
        }
        Err(JobError::Retryable(message.to_string()))
    }

    async fn record_terminal(&self, task_id: uuid::Uuid, published: bool) {
        let stored = match self.store.publish_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "could not reload task for record sink");
                return;
            }
        };
        let result = if published {
            self.records.publish_completed(&stored).await
        } else {
            self.records.publish_failed(&stored).await
        };
        if let Err(e) = result {
            warn!(task_id = %task_id, error = %e, "publish record sink failed");
        }
    }
}

#[async_trait]
impl JobHandler for PublishJobHandler {
    async fn process(&self, job: &Job) -> Result<JobDisposition, JobError> {
        let Some(task) = self.store.publish_task(job.task_id).await.map_err(infra)? else {
            debug!(task_id = %job.task_id, "task no longer exists, dropping delivery");
            return Ok(JobDisposition::Complete);
        };

        // Duplicate-delivery defense: a terminal task takes no action.
        if !task.status.is_dispatchable() {
            debug!(task_id = %task.id, status = %task.status, "task not dispatchable, no-op");
            self.store.set_in_queue(task.id, false).await.map_err(infra)?;
            return Ok(JobDisposition::Complete);
        }

        let adapter = match self.registry.resolve(task.platform) {
            Ok(adapter) => adapter,
            Err(e) => return self.permanent_failure(&task, &e.to_string()).await,
        };

        let timeout = self.config.platform_call_timeout();
        match tokio::time::timeout(timeout, adapter.check_auth(&task.account_id)).await {
            Err(_) => return self.transient_failure(job, &task, "auth probe timed out").await,
            Ok(Err(e)) if e.is_permanent() => {
                return self.permanent_failure(&task, &e.to_string()).await
            }
            Ok(Err(e)) => return self.transient_failure(job, &task, &e.to_string()).await,
            Ok(Ok(probe)) if probe.status == AuthStatus::Expired => {
                return self
                    .transient_failure(job, &task, "account authorization expired")
                    .await
            }
            Ok(Ok(_)) => {}
        }

        if !self
            .machine
            .begin_publishing(task.id)
            .await
            .map_err(infra)?
            .was_applied()
        {
            self.store.set_in_queue(task.id, false).await.map_err(infra)?;
            return Ok(JobDisposition::Complete);
        }
        self.hub
            .notify(Notification::PublishStatusChanged {
                task_id: task.id,
                platform: task.platform,
                status: PublishStatus::Publishing,
            })
            .await;

        match tokio::time::timeout(timeout, adapter.execute(&task)).await {
            Err(_) => self.transient_failure(job, &task, "platform call timed out").await,
            Ok(Err(e)) if e.is_permanent() => self.permanent_failure(&task, &e.to_string()).await,
            Ok(Err(e)) => self.transient_failure(job, &task, &e.to_string()).await,
            Ok(Ok(outcome)) => self.apply_outcome(job, &task, outcome).await,
        }
    }

    fn name(&self) -> &'static str {
        "publish"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterError, AuthProbe, PlatformAdapter};
    use crate::error::Result as PubflowResult;
    use crate::models::{AccountInfo, Platform, PostContent};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    enum Behavior {
        Publish,
        PublishBare,
        Staging,
        Reject,
        Flaky,
        AuthExpired,
    }

    struct ScriptedAdapter {
        behavior: Behavior,
        execute_calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                execute_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PlatformAdapter for ScriptedAdapter {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn check_auth(
            &self,
            _account_id: &str,
        ) -> std::result::Result<AuthProbe, AdapterError> {
            match self.behavior {
                Behavior::AuthExpired => Ok(AuthProbe::expired(None)),
                _ => Ok(AuthProbe::ok()),
            }
        }

        async fn execute(
            &self,
            _task: &PublishTask,
        ) -> std::result::Result<ExecuteOutcome, AdapterError> {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Publish => Ok(ExecuteOutcome::published("posted")
                    .with_platform_item("item-9")
                    .with_work_link("https://example.com/p/item-9")),
                Behavior::PublishBare => Ok(ExecuteOutcome::published("posted")),
                Behavior::Staging => Ok(ExecuteOutcome::publishing("media processing")),
                Behavior::Reject => Err(AdapterError::Rejected("bad media".to_string())),
                Behavior::Flaky => Err(AdapterError::Network("connection reset".to_string())),
                Behavior::AuthExpired => unreachable!("auth probe fails first"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        completed: Mutex<Vec<Uuid>>,
        failed: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl PublishRecordSink for RecordingSink {
        async fn publish_completed(&self, task: &PublishTask) -> PubflowResult<()> {
            self.completed.lock().push(task.id);
            Ok(())
        }

        async fn publish_failed(&self, task: &PublishTask) -> PubflowResult<()> {
            self.failed.lock().push(task.id);
            Ok(())
        }
    }

    async fn setup(
        adapter: Arc<ScriptedAdapter>,
    ) -> (PublishJobHandler, Arc<MemoryStore>, Arc<RecordingSink>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(AdapterRegistry::new().with_adapter(adapter));
        let handler = PublishJobHandler::new(
            store.clone(),
            registry,
            sink.clone(),
            NotificationHub::new(),
            Config::default(),
        );

        let account = AccountInfo {
            account_id: "acc-1".to_string(),
            uid: "ext-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let task = PublishTask::new(
            &account,
            Platform::Instagram,
            PostContent::default(),
            Utc::now(),
        );
        let id = task.id;
        store.create_publish_task(task).await.unwrap();
        (handler, store, sink, id)
    }

    fn job_for(id: Uuid, attempts: u32) -> Job {
        Job {
            key: format!("publish:instagram:{id}"),
            task_id: id,
            attempts,
        }
    }

    #[tokio::test]
    async fn test_single_call_publish_completes_and_records() {
        let adapter = ScriptedAdapter::new(Behavior::Publish);
        let (handler, store, sink, id) = setup(adapter).await;

        let disposition = handler.process(&job_for(id, 0)).await.unwrap();
        assert_eq!(disposition, JobDisposition::Complete);

        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Published);
        assert_eq!(task.platform_item_id.as_deref(), Some("item-9"));
        assert_eq!(
            task.work_link.as_deref(),
            Some("https://example.com/p/item-9")
        );
        assert!(!task.in_queue);
        assert_eq!(sink.completed.lock().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_publish_without_item_id_leaves_field_unset() {
        let adapter = ScriptedAdapter::new(Behavior::PublishBare);
        let (handler, store, sink, id) = setup(adapter).await;

        let disposition = handler.process(&job_for(id, 0)).await.unwrap();
        assert_eq!(disposition, JobDisposition::Complete);

        // No id from the outcome and none staged: the field stays empty
        // rather than holding a matchable empty string.
        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Published);
        assert_eq!(task.platform_item_id, None);
        assert_eq!(sink.completed.lock().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_terminal_task_delivery_is_a_no_op() {
        let adapter = ScriptedAdapter::new(Behavior::Publish);
        let (handler, store, sink, id) = setup(adapter.clone()).await;

        store
            .transition_publish_status(
                id,
                &[PublishStatus::WaitingForPublish],
                PublishStatus::Publishing,
                None,
            )
            .await
            .unwrap();
        store
            .complete_publish_task(id, Some("earlier"), None)
            .await
            .unwrap();

        let disposition = handler.process(&job_for(id, 0)).await.unwrap();
        assert_eq!(disposition, JobDisposition::Complete);
        assert_eq!(adapter.execute_calls.load(Ordering::SeqCst), 0);
        assert!(sink.completed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_rejection_fails_without_retry() {
        let adapter = ScriptedAdapter::new(Behavior::Reject);
        let (handler, store, sink, id) = setup(adapter).await;

        let err = handler.process(&job_for(id, 0)).await.unwrap_err();
        assert!(matches!(err, JobError::Fatal(_)));

        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Failed);
        assert!(task.error_msg.unwrap().contains("bad media"));
        assert_eq!(sink.failed.lock().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_transient_failure_fails_only_on_final_attempt() {
        let adapter = ScriptedAdapter::new(Behavior::Flaky);
        let (handler, store, _sink, id) = setup(adapter).await;

        let err = handler.process(&job_for(id, 0)).await.unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Publishing);

        // Default budget is three attempts; the third one ends the task.
        let err = handler.process(&job_for(id, 2)).await.unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Failed);
    }

    #[tokio::test]
    async fn test_staged_outcome_reschedules_poll() {
        let adapter = ScriptedAdapter::new(Behavior::Staging);
        let (handler, store, _sink, id) = setup(adapter).await;

        let disposition = handler.process(&job_for(id, 0)).await.unwrap();
        assert!(matches!(disposition, JobDisposition::Reschedule { .. }));

        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Publishing);
        assert_eq!(task.staging_cycles, 1);
    }

    #[tokio::test]
    async fn test_staging_budget_forces_failure() {
        let adapter = ScriptedAdapter::new(Behavior::Staging);
        let (handler, store, sink, id) = setup(adapter).await;

        for _ in 0..(Config::default().staging_cycle_budget - 1) {
            store.increment_staging_cycles(id).await.unwrap();
        }

        let err = handler.process(&job_for(id, 0)).await.unwrap_err();
        assert!(matches!(err, JobError::Fatal(_)));
        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::Failed);
        assert!(task.error_msg.unwrap().contains("poll cycles"));
        assert_eq!(sink.failed.lock().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_expired_auth_is_transient_and_leaves_task_waiting() {
        let adapter = ScriptedAdapter::new(Behavior::AuthExpired);
        let (handler, store, _sink, id) = setup(adapter).await;

        let err = handler.process(&job_for(id, 0)).await.unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
        let task = store.publish_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, PublishStatus::WaitingForPublish);
    }
}
