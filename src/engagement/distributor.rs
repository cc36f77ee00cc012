use super::{reply_key, Comment, CommentSource, ReplyGenerator};
use crate::config::Config;
use crate::error::PubflowError;
use crate::models::{EngagementStatus, EngagementSubTask, EngagementTask, SubTaskStatus};
use crate::notifications::{Notification, NotificationHub};
use crate::queue::{
    DispatchQueue, EnqueueOutcome, Job, JobDisposition, JobError, JobHandler, JobOptions,
};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn infra(e: PubflowError) -> JobError {
    JobError::Retryable(format!("store failure: {e}"))
}

/// Consumes the distribution queue: turns one engagement task into
/// per-comment sub-tasks, each enqueued on the reply queue.
///
/// Failure isolation: a comment whose reply cannot be generated or
/// enqueued is logged and skipped, never aborting the batch. The parent
/// ends `Distributed` when at least one sub-task was enqueued, `Failed`
/// when none were.
pub struct EngagementDistributor {
    store: Arc<dyn TaskStore>,
    comments: Arc<dyn CommentSource>,
    generator: Arc<dyn ReplyGenerator>,
    reply_queue: Arc<DispatchQueue>,
    hub: NotificationHub,
    config: Config,
}

impl EngagementDistributor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        comments: Arc<dyn CommentSource>,
        generator: Arc<dyn ReplyGenerator>,
        reply_queue: Arc<DispatchQueue>,
        hub: NotificationHub,
        config: Config,
    ) -> Self {
        Self {
            store,
            comments,
            generator,
            reply_queue,
            hub,
            config,
        }
    }

    /// Distribute one batch of comments: skip the ones already completed,
    /// generate replies for the rest, create and enqueue a sub-task per
    /// generated reply. Returns how many sub-tasks were enqueued.
    async fn distribute_batch(
        &self,
        task: &EngagementTask,
        batch: Vec<Comment>,
    ) -> Result<u32, JobError> {
        let mut pending = Vec::with_capacity(batch.len());
        for comment in batch {
            if self
                .store
                .has_completed_sub_task(&task.post_id, &comment.id)
                .await
                .map_err(infra)?
            {
                debug!(
                    task_id = %task.id,
                    comment_id = %comment.id,
                    "comment already has a completed reply, skipping"
                );
                continue;
            }
            pending.push(comment);
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let replies = match self
            .generator
            .batch_generate(
                &task.user_id,
                &task.model,
                task.prompt.as_deref(),
                &pending,
            )
            .await
        {
            Ok(replies) => replies,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "reply generation failed for batch, skipping it");
                return Ok(0);
            }
        };

        let mut enqueued = 0;
        for comment in pending {
            let Some(reply) = replies.get(&comment.id) else {
                warn!(
                    task_id = %task.id,
                    comment_id = %comment.id,
                    "no reply generated for comment, skipping"
                );
                continue;
            };

            let mut sub_task = EngagementSubTask::new(task, comment.id.clone(), comment.content);
            sub_task.reply_content = Some(reply.clone());
            sub_task.status = SubTaskStatus::Queued;
            let sub_id = sub_task.id;
            let key = reply_key(&sub_task);

            if let Err(e) = self.store.create_sub_task(sub_task).await {
                warn!(task_id = %task.id, comment_id = %comment.id, error = %e, "could not persist sub-task, skipping");
                continue;
            }

            let opts = JobOptions::immediate(
                self.config.publish_retry_attempts,
                self.config.publish_retry_backoff(),
            );
            match self.reply_queue.enqueue(&key, sub_id, opts) {
                EnqueueOutcome::Enqueued => enqueued += 1,
                EnqueueOutcome::Duplicate => {
                    warn!(sub_task_id = %sub_id, "reply entry already queued, skipping");
                }
            }
        }

        if enqueued > 0 {
            self.store
                .increment_total_sub_tasks(task.id, enqueued)
                .await
                .map_err(infra)?;
        }
        Ok(enqueued)
    }

    async fn distribute_all(&self, task: &EngagementTask) -> Result<u32, JobError> {
        let mut enqueued = 0;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .comments
                .fetch_post_comments(&task.account_id, &task.post_id, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if enqueued > 0 => {
                    // Keep what was already distributed; a redelivery
                    // would duplicate the earlier pages. The sub-tasks
                    // already on the reply queue make this a distributed
                    // task, so the status is persisted before bailing.
                    warn!(task_id = %task.id, error = %e, "pagination broke mid-run, keeping partial distribution");
                    self.finalize(task.id, EngagementStatus::Distributed)
                        .await?;
                    return Err(JobError::Fatal(e.to_string()));
                }
                Err(e) => return Err(JobError::Retryable(e.to_string())),
            };

            if page.comments.is_empty() {
                break;
            }
            enqueued += self.distribute_batch(task, page.comments).await?;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(enqueued)
    }

    async fn distribute_partial(
        &self,
        task: &EngagementTask,
        comment_ids: &[String],
    ) -> Result<u32, JobError> {
        let batch = self
            .comments
            .fetch_comments(&task.account_id, &task.post_id, comment_ids)
            .await
            .map_err(|e| JobError::Retryable(e.to_string()))?;
        self.distribute_batch(task, batch).await
    }

    async fn finalize(&self, task_id: Uuid, status: EngagementStatus) -> Result<(), JobError> {
        self.store
            .update_engagement_status(task_id, status)
            .await
            .map_err(infra)?;
        self.hub
            .notify(Notification::EngagementStatusChanged { task_id, status })
            .await;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for EngagementDistributor {
    async fn process(&self, job: &Job) -> Result<JobDisposition, JobError> {
        let Some(task) = self.store.engagement_task(job.task_id).await.map_err(infra)? else {
            debug!(task_id = %job.task_id, "engagement task no longer exists, dropping delivery");
            return Ok(JobDisposition::Complete);
        };

        let enqueued = match &task.target_scope {
            crate::models::TargetScope::All => self.distribute_all(&task).await?,
            crate::models::TargetScope::Partial { comment_ids } => {
                self.distribute_partial(&task, comment_ids).await?
            }
        };

        // Failed means the task never enqueued anything, across all
        // deliveries. A redelivery that finds every comment already
        // replied adds nothing but keeps the task distributed.
        let status = if enqueued > 0 || task.total_sub_tasks > 0 {
            EngagementStatus::Distributed
        } else {
            EngagementStatus::Failed
        };
        self.finalize(task.id, status).await?;
        info!(
            task_id = %task.id,
            enqueued,
            status = %status,
            "engagement distribution finished"
        );
        Ok(JobDisposition::Complete)
    }

    fn name(&self) -> &'static str {
        "engagement_distribution"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::CommentPage;
    use crate::error::Result as PubflowResult;
    use crate::models::{Platform, TargetScope};
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct PagedComments {
        pages: Vec<Vec<Comment>>,
    }

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            content: format!("content of {id}"),
        }
    }

    #[async_trait]
    impl CommentSource for PagedComments {
        async fn fetch_post_comments(
            &self,
            _account_id: &str,
            _post_id: &str,
            cursor: Option<&str>,
        ) -> PubflowResult<CommentPage> {
            let index: usize = cursor.map(|c| c.parse().unwrap_or(0)).unwrap_or(0);
            let comments = self.pages.get(index).cloned().unwrap_or_default();
            let next_cursor = if index + 1 < self.pages.len() {
                Some((index + 1).to_string())
            } else {
                None
            };
            Ok(CommentPage {
                comments,
                next_cursor,
            })
        }

        async fn fetch_comments(
            &self,
            _account_id: &str,
            _post_id: &str,
            comment_ids: &[String],
        ) -> PubflowResult<Vec<Comment>> {
            Ok(comment_ids.iter().map(|id| comment(id)).collect())
        }
    }

    /// First page succeeds, every later page fetch errors.
    struct BrokenSecondPage {
        first: Vec<Comment>,
    }

    #[async_trait]
    impl CommentSource for BrokenSecondPage {
        async fn fetch_post_comments(
            &self,
            _account_id: &str,
            _post_id: &str,
            cursor: Option<&str>,
        ) -> PubflowResult<CommentPage> {
            if cursor.is_some() {
                return Err(PubflowError::EngagementError(
                    "comment api returned 500".to_string(),
                ));
            }
            Ok(CommentPage {
                comments: self.first.clone(),
                next_cursor: Some("1".to_string()),
            })
        }

        async fn fetch_comments(
            &self,
            _account_id: &str,
            _post_id: &str,
            comment_ids: &[String],
        ) -> PubflowResult<Vec<Comment>> {
            Ok(comment_ids.iter().map(|id| comment(id)).collect())
        }
    }

    struct EchoGenerator {
        fail: bool,
        skip: Vec<String>,
    }

    #[async_trait]
    impl ReplyGenerator for EchoGenerator {
        async fn batch_generate(
            &self,
            _user_id: &str,
            _model: &str,
            _prompt: Option<&str>,
            comments: &[Comment],
        ) -> PubflowResult<HashMap<String, String>> {
            if self.fail {
                return Err(PubflowError::EngagementError(
                    "generation backend down".to_string(),
                ));
            }
            Ok(comments
                .iter()
                .filter(|c| !self.skip.contains(&c.id))
                .map(|c| (c.id.clone(), format!("re: {}", c.content)))
                .collect())
        }
    }

    async fn setup(
        pages: Vec<Vec<Comment>>,
        generator: EchoGenerator,
        scope: TargetScope,
    ) -> (EngagementDistributor, Arc<MemoryStore>, Arc<DispatchQueue>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let reply_queue = DispatchQueue::new("engagement_reply_to_comment_task");
        let distributor = EngagementDistributor::new(
            store.clone(),
            Arc::new(PagedComments { pages }),
            Arc::new(generator),
            reply_queue.clone(),
            NotificationHub::new(),
            Config::default(),
        );

        let task = crate::models::EngagementTask::new(
            "user-1".to_string(),
            "acc-1".to_string(),
            "post-1".to_string(),
            Platform::Facebook,
            scope,
            "gpt-4o-mini".to_string(),
            None,
        );
        let id = task.id;
        store.create_engagement_task(task).await.unwrap();
        (distributor, store, reply_queue, id)
    }

    fn job_for(id: Uuid) -> Job {
        Job {
            key: format!("engagement:facebook:{id}"),
            task_id: id,
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_all_scope_paginates_and_counts_per_page() {
        let pages = vec![
            vec![comment("c1"), comment("c2"), comment("c3")],
            vec![comment("c4"), comment("c5")],
        ];
        let (distributor, store, reply_queue, id) = setup(
            pages,
            EchoGenerator {
                fail: false,
                skip: vec![],
            },
            TargetScope::All,
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();

        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, EngagementStatus::Distributed);
        assert_eq!(task.total_sub_tasks, 5);
        assert_eq!(store.sub_tasks_for_task(id).await.unwrap().len(), 5);
        assert_eq!(reply_queue.outstanding(), 5);
    }

    #[tokio::test]
    async fn test_rerun_skips_completed_sub_tasks() {
        let pages = vec![
            vec![comment("c1"), comment("c2"), comment("c3")],
            vec![comment("c4"), comment("c5")],
        ];
        let (distributor, store, _reply_queue, id) = setup(
            pages,
            EchoGenerator {
                fail: false,
                skip: vec![],
            },
            TargetScope::All,
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();
        let subs = store.sub_tasks_for_task(id).await.unwrap();
        for sub in subs.iter().filter(|s| s.comment_id == "c1" || s.comment_id == "c4") {
            store
                .update_sub_task_status(sub.id, SubTaskStatus::Completed)
                .await
                .unwrap();
        }

        distributor.process(&job_for(id)).await.unwrap();
        let subs = store.sub_tasks_for_task(id).await.unwrap();
        // 5 from the first run plus only the 3 not yet completed.
        assert_eq!(subs.len(), 8);
        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.total_sub_tasks, 8);
    }

    #[tokio::test]
    async fn test_partial_scope_creates_sub_task_per_comment() {
        let (distributor, store, reply_queue, id) = setup(
            vec![],
            EchoGenerator {
                fail: false,
                skip: vec![],
            },
            TargetScope::Partial {
                comment_ids: vec!["c1".to_string(), "c2".to_string()],
            },
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();

        let subs = store.sub_tasks_for_task(id).await.unwrap();
        assert_eq!(subs.len(), 2);
        assert!(subs
            .iter()
            .all(|s| s.reply_content.as_deref().unwrap().starts_with("re: ")));
        assert!(subs.iter().all(|s| s.status == SubTaskStatus::Queued));
        assert_eq!(reply_queue.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_ungenerated_comment_is_skipped_not_fatal() {
        let pages = vec![vec![comment("c1"), comment("c2")]];
        let (distributor, store, reply_queue, id) = setup(
            pages,
            EchoGenerator {
                fail: false,
                skip: vec!["c2".to_string()],
            },
            TargetScope::All,
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();

        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, EngagementStatus::Distributed);
        assert_eq!(task.total_sub_tasks, 1);
        assert_eq!(reply_queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_all_completed_stays_distributed() {
        let pages = vec![vec![comment("c1")]];
        let (distributor, store, _reply_queue, id) = setup(
            pages,
            EchoGenerator {
                fail: false,
                skip: vec![],
            },
            TargetScope::All,
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();
        let subs = store.sub_tasks_for_task(id).await.unwrap();
        store
            .update_sub_task_status(subs[0].id, SubTaskStatus::Completed)
            .await
            .unwrap();

        // Redelivery finds every comment already replied and enqueues
        // nothing; the task must not flip to Failed.
        distributor.process(&job_for(id)).await.unwrap();
        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, EngagementStatus::Distributed);
        assert_eq!(task.total_sub_tasks, 1);
        assert_eq!(store.sub_tasks_for_task(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mid_pagination_failure_keeps_partial_distribution() {
        let store = Arc::new(MemoryStore::new());
        let reply_queue = DispatchQueue::new("engagement_reply_to_comment_task");
        let distributor = EngagementDistributor::new(
            store.clone(),
            Arc::new(BrokenSecondPage {
                first: vec![comment("c1")],
            }),
            Arc::new(EchoGenerator {
                fail: false,
                skip: vec![],
            }),
            reply_queue.clone(),
            NotificationHub::new(),
            Config::default(),
        );
        let task = crate::models::EngagementTask::new(
            "user-1".to_string(),
            "acc-1".to_string(),
            "post-1".to_string(),
            Platform::Facebook,
            TargetScope::All,
            "gpt-4o-mini".to_string(),
            None,
        );
        let id = task.id;
        store.create_engagement_task(task).await.unwrap();

        let err = distributor.process(&job_for(id)).await.unwrap_err();
        assert!(matches!(err, JobError::Fatal(_)));

        // The first page's sub-task is kept and the parent reflects it.
        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, EngagementStatus::Distributed);
        assert_eq!(task.total_sub_tasks, 1);
        assert_eq!(reply_queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_zero_enqueued_fails_the_task() {
        let pages = vec![vec![comment("c1")]];
        let (distributor, store, reply_queue, id) = setup(
            pages,
            EchoGenerator {
                fail: true,
                skip: vec![],
            },
            TargetScope::All,
        )
        .await;

        distributor.process(&job_for(id)).await.unwrap();

        let task = store.engagement_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, EngagementStatus::Failed);
        assert_eq!(task.total_sub_tasks, 0);
        assert_eq!(reply_queue.outstanding(), 0);
    }
}
