use super::ReplyPoster;
use crate::config::Config;
use crate::error::PubflowError;
use crate::models::SubTaskStatus;
use crate::queue::{Job, JobDisposition, JobError, JobHandler};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

fn infra(e: PubflowError) -> JobError {
    JobError::Retryable(format!("store failure: {e}"))
}

/// Consumes the reply queue: posts one generated reply and maintains the
/// sub-task status plus the parent's completed/failed counters.
pub struct ReplyJobHandler {
    store: Arc<dyn TaskStore>,
    poster: Arc<dyn ReplyPoster>,
    config: Config,
}

impl ReplyJobHandler {
    pub fn new(store: Arc<dyn TaskStore>, poster: Arc<dyn ReplyPoster>, config: Config) -> Self {
        Self {
            store,
            poster,
            config,
        }
    }

    async fn mark_failed(&self, sub_task_id: Uuid, parent_id: Uuid) -> Result<(), JobError> {
        self.store
            .update_sub_task_status(sub_task_id, SubTaskStatus::Failed)
            .await
            .map_err(infra)?;
        self.store
            .increment_failed_sub_tasks(parent_id)
            .await
            .map_err(infra)?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ReplyJobHandler {
    async fn process(&self, job: &Job) -> Result<JobDisposition, JobError> {
        let Some(sub_task) = self.store.sub_task(job.task_id).await.map_err(infra)? else {
            debug!(sub_task_id = %job.task_id, "sub-task no longer exists, dropping delivery");
            return Ok(JobDisposition::Complete);
        };

        // Duplicate-delivery defense; completed counters stay accurate.
        if sub_task.status == SubTaskStatus::Completed {
            debug!(sub_task_id = %sub_task.id, "sub-task already completed, no-op");
            return Ok(JobDisposition::Complete);
        }
        if sub_task.reply_content.is_none() {
            warn!(sub_task_id = %sub_task.id, "sub-task has no generated reply, failing it");
            self.mark_failed(sub_task.id, sub_task.task_id).await?;
            return Err(JobError::Fatal("sub-task has no generated reply".to_string()));
        }

        match self.poster.post_reply(&sub_task).await {
            Ok(()) => {
                self.store
                    .update_sub_task_status(sub_task.id, SubTaskStatus::Completed)
                    .await
                    .map_err(infra)?;
                self.store
                    .increment_completed_sub_tasks(sub_task.task_id)
                    .await
                    .map_err(infra)?;
                debug!(
                    sub_task_id = %sub_task.id,
                    comment_id = %sub_task.comment_id,
                    "reply posted"
                );
                Ok(JobDisposition::Complete)
            }
            Err(e) if e.is_permanent() => {
                self.mark_failed(sub_task.id, sub_task.task_id).await?;
                Err(JobError::Fatal(e.to_string()))
            }
            Err(e) => {
                let final_attempt = job.attempts + 1 >= self.config.publish_retry_attempts;
                if final_attempt {
                    self.mark_failed(sub_task.id, sub_task.task_id).await?;
                }
                Err(JobError::Retryable(e.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "engagement_reply"
    }
}
