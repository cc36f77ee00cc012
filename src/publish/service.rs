use super::AccountSource;
use crate::config::Config;
use crate::error::{PubflowError, Result};
use crate::models::{Platform, PostContent, PublishTask};
use crate::notifications::{Notification, NotificationHub};
use crate::queue::{CancelOutcome, DispatchQueue, EnqueueOutcome, JobOptions, QueueError};
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// User-facing task lifecycle operations. All timing decisions (immediate
/// enqueue vs sweep pickup) are made here; execution belongs to the
/// worker.
pub struct PublishService {
    store: Arc<dyn TaskStore>,
    queue: Arc<DispatchQueue>,
    accounts: Arc<dyn AccountSource>,
    hub: NotificationHub,
    config: Config,
}

impl PublishService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<DispatchQueue>,
        accounts: Arc<dyn AccountSource>,
        hub: NotificationHub,
        config: Config,
    ) -> Self {
        Self {
            store,
            queue,
            accounts,
            hub,
            config,
        }
    }

    /// Create a publish task. When the target time is within the
    /// immediate threshold the task is enqueued synchronously instead of
    /// waiting for the next sweep.
    pub async fn create(
        &self,
        account_id: &str,
        platform: Platform,
        content: PostContent,
        publish_time: DateTime<Utc>,
    ) -> Result<PublishTask> {
        if content.description.is_none() && !content.has_images() && !content.has_video() {
            return Err(PubflowError::ValidationError(
                "publish task needs a description, images or a video".to_string(),
            ));
        }

        let account = self
            .accounts
            .account_info(account_id)
            .await?
            .ok_or_else(|| {
                PubflowError::ValidationError(format!("unknown account: {account_id}"))
            })?;

        let task = PublishTask::new(&account, platform, content, publish_time);
        self.store.create_publish_task(task.clone()).await?;
        info!(
            task_id = %task.id,
            platform = %platform,
            publish_time = %publish_time,
            "publish task created"
        );

        let until_due = (publish_time - Utc::now()).num_milliseconds();
        if until_due <= self.config.immediate_publish_threshold_ms {
            self.enqueue_task(&task).await?;
        }

        Ok(task)
    }

    /// Delete a task owned by `user_id`. Only a task whose queue entry is
    /// still waiting or delayed (or has none) can be deleted; an active
    /// entry means the caller must wait for it to settle.
    pub async fn delete(&self, id: Uuid, user_id: &str) -> Result<bool> {
        let Some(task) = self.store.publish_task(id).await? else {
            return Ok(false);
        };
        if task.user_id != user_id {
            return Ok(false);
        }

        self.cancel_queue_entry(&task.queue_id)?;
        let deleted = self.store.delete_publish_task(id, user_id).await?;
        if deleted {
            info!(task_id = %id, "publish task deleted");
        }
        Ok(deleted)
    }

    /// Move a waiting task to a new target time. Any pending queue entry
    /// is cancelled so the sweep (or the immediate path) re-enqueues at
    /// the new time.
    pub async fn reschedule(
        &self,
        id: Uuid,
        user_id: &str,
        publish_time: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(task) = self.store.publish_task(id).await? else {
            return Ok(false);
        };
        if task.user_id != user_id {
            return Ok(false);
        }
        if task.status != crate::models::PublishStatus::WaitingForPublish {
            return Err(PubflowError::ValidationError(format!(
                "only a waiting task can be rescheduled, task {id} is {}",
                task.status
            )));
        }

        self.cancel_queue_entry(&task.queue_id)?;
        self.store.set_publish_time(id, publish_time).await?;
        self.store.set_in_queue(id, false).await?;
        info!(task_id = %id, publish_time = %publish_time, "publish task rescheduled");

        let until_due = (publish_time - Utc::now()).num_milliseconds();
        if until_due <= self.config.immediate_publish_threshold_ms {
            let mut refreshed = task;
            refreshed.publish_time = publish_time;
            self.enqueue_task(&refreshed).await?;
        }
        Ok(true)
    }

    /// Publish a waiting task immediately: rewrite its target time to now,
    /// drop any stale queue entry and enqueue a fresh one.
    pub async fn publish_now(&self, id: Uuid, user_id: &str) -> Result<()> {
        let Some(task) = self.store.publish_task(id).await? else {
            return Err(PubflowError::ValidationError(format!(
                "unknown publish task: {id}"
            )));
        };
        if task.user_id != user_id {
            return Err(PubflowError::ValidationError(format!(
                "task {id} does not belong to user {user_id}"
            )));
        }
        if task.status != crate::models::PublishStatus::WaitingForPublish {
            return Err(PubflowError::ValidationError(format!(
                "only a waiting task can be published now, task {id} is {}",
                task.status
            )));
        }

        self.cancel_queue_entry(&task.queue_id)?;
        let now = Utc::now();
        self.store.set_publish_time(id, now).await?;

        let mut refreshed = task;
        refreshed.publish_time = now;
        self.enqueue_task(&refreshed).await?;
        info!(task_id = %id, "publish task forced to publish now");
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<PublishTask>> {
        self.store.list_publish_tasks(user_id).await
    }

    /// Hand a task to the dispatch queue, delayed until its target time.
    /// A duplicate key means an entry is already outstanding; that is the
    /// dedup working, not an error.
    async fn enqueue_task(&self, task: &PublishTask) -> Result<()> {
        let delay_ms = (task.publish_time - Utc::now()).num_milliseconds().max(0);
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
                self.hub
                    .notify(Notification::PublishTaskEnqueued {
                        task_id: task.id,
                        platform: task.platform,
                    })
                    .await;
            }
            EnqueueOutcome::Duplicate => {
                debug!(task_id = %task.id, "task already queued, enqueue skipped");
            }
        }
        Ok(())
    }

    fn cancel_queue_entry(&self, queue_id: &str) -> Result<()> {
        match self.queue.cancel_if_pending(queue_id) {
            CancelOutcome::Cancelled => {
                debug!(queue_id = %queue_id, "cancelled pending queue entry");
                Ok(())
            }
            // Nothing queued is fine; the task was waiting for a sweep.
            CancelOutcome::NotFound => Ok(()),
            CancelOutcome::Active => Err(PubflowError::QueueError(
                QueueError::ActiveJob(queue_id.to_string()).to_string(),
            )),
        }
    }
}
