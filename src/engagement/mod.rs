//! # Engagement Distribution
//!
//! Fans a bulk "reply to comments on this post" request out into one
//! sub-task per comment. The distributor generates replies in batches
//! through the [`ReplyGenerator`] collaborator and enqueues each sub-task
//! on its own queue; a second worker later posts the replies through the
//! [`ReplyPoster`] and maintains the parent's counters.
//!
//! Comment discovery and the actual platform calls live behind traits;
//! only the fan-out, idempotence and counter bookkeeping are owned here.

mod distributor;
mod reply_worker;

pub use distributor::EngagementDistributor;
pub use reply_worker::ReplyJobHandler;

use crate::adapters::AdapterError;
use crate::config::Config;
use crate::error::Result;
use crate::models::{EngagementSubTask, EngagementTask, Platform, TargetScope};
use crate::queue::{DispatchQueue, EnqueueOutcome, JobOptions};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One comment on a published post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub content: String,
}

/// One page of comments from cursor-based pagination.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub next_cursor: Option<String>,
}

/// Comment discovery collaborator.
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Fetch one page of a post's comments. `cursor` of `None` means the
    /// first page; an empty page ends the pagination.
    async fn fetch_post_comments(
        &self,
        account_id: &str,
        post_id: &str,
        cursor: Option<&str>,
    ) -> Result<CommentPage>;

    /// Resolve an explicit set of comment identities to their content.
    async fn fetch_comments(
        &self,
        account_id: &str,
        post_id: &str,
        comment_ids: &[String],
    ) -> Result<Vec<Comment>>;
}

/// Reply-generation collaborator. One batch call per comment page;
/// returns a map from comment id to generated reply text. A comment
/// missing from the map is skipped, not an error.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn batch_generate(
        &self,
        user_id: &str,
        model: &str,
        prompt: Option<&str>,
        comments: &[Comment],
    ) -> Result<HashMap<String, String>>;
}

/// Posts one generated reply to its comment on the platform.
#[async_trait]
pub trait ReplyPoster: Send + Sync {
    async fn post_reply(
        &self,
        sub_task: &EngagementSubTask,
    ) -> std::result::Result<(), AdapterError>;
}

/// User-facing entry point: record the request and hand it to the
/// distribution queue.
pub struct EngagementService {
    store: Arc<dyn TaskStore>,
    distribution_queue: Arc<DispatchQueue>,
    config: Config,
}

impl EngagementService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        distribution_queue: Arc<DispatchQueue>,
        config: Config,
    ) -> Self {
        Self {
            store,
            distribution_queue,
            config,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        user_id: &str,
        account_id: &str,
        post_id: &str,
        platform: Platform,
        target_scope: TargetScope,
        model: &str,
        prompt: Option<String>,
    ) -> Result<EngagementTask> {
        let task = EngagementTask::new(
            user_id.to_string(),
            account_id.to_string(),
            post_id.to_string(),
            platform,
            target_scope,
            model.to_string(),
            prompt,
        );
        self.store.create_engagement_task(task.clone()).await?;

        let key = distribution_key(&task);
        let opts = JobOptions::immediate(
            self.config.publish_retry_attempts,
            self.config.publish_retry_backoff(),
        );
        match self.distribution_queue.enqueue(&key, task.id, opts) {
            EnqueueOutcome::Enqueued => {
                info!(task_id = %task.id, post_id = %task.post_id, "engagement task enqueued for distribution");
            }
            EnqueueOutcome::Duplicate => {
                debug!(task_id = %task.id, "engagement task already queued");
            }
        }
        Ok(task)
    }
}

pub(crate) fn distribution_key(task: &EngagementTask) -> String {
    format!("engagement:{}:{}", task.platform, task.id)
}

pub(crate) fn reply_key(sub_task: &EngagementSubTask) -> String {
    format!("reply:{}:{}", sub_task.platform, sub_task.id)
}
