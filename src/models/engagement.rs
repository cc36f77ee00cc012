use super::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a bulk reply request. `Distributed` means every sub-task
/// has been enqueued for posting, not that replies have landed; `Failed`
/// is reserved for the case where zero sub-tasks could be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Created,
    Distributed,
    Failed,
}

impl fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Distributed => write!(f, "distributed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of one generated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Created,
    Queued,
    Completed,
    Failed,
}

/// Which comments an engagement task targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum TargetScope {
    /// Every comment on the post, discovered by cursor pagination
    All,
    /// An explicit set of comment identities
    Partial { comment_ids: Vec<String> },
}

/// A bulk "reply to comments on this post" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementTask {
    pub id: Uuid,
    pub user_id: String,
    pub account_id: String,
    pub post_id: String,
    pub platform: Platform,
    pub target_scope: TargetScope,
    /// Model identifier for the reply-generation collaborator
    pub model: String,
    pub prompt: Option<String>,
    pub status: EngagementStatus,
    /// Counters are monotonically non-decreasing.
    pub total_sub_tasks: u32,
    pub completed_sub_tasks: u32,
    pub failed_sub_tasks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EngagementTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        account_id: String,
        post_id: String,
        platform: Platform,
        target_scope: TargetScope,
        model: String,
        prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            post_id,
            platform,
            target_scope,
            model,
            prompt,
            status: EngagementStatus::Created,
            total_sub_tasks: 0,
            completed_sub_tasks: 0,
            failed_sub_tasks: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One generated reply targeting one specific comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSubTask {
    pub id: Uuid,
    /// Owning engagement task
    pub task_id: Uuid,
    pub user_id: String,
    pub account_id: String,
    pub post_id: String,
    pub platform: Platform,
    pub comment_id: String,
    pub comment_content: String,
    pub reply_content: Option<String>,
    pub status: SubTaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EngagementSubTask {
    pub fn new(parent: &EngagementTask, comment_id: String, comment_content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: parent.id,
            user_id: parent.user_id.clone(),
            account_id: parent.account_id.clone(),
            post_id: parent.post_id.clone(),
            platform: parent.platform,
            comment_id,
            comment_content,
            reply_content: None,
            status: SubTaskStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_scope_serde() {
        let scope = TargetScope::Partial {
            comment_ids: vec!["c1".to_string(), "c2".to_string()],
        };
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["scope"], "partial");
        let parsed: TargetScope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, scope);
    }

    #[test]
    fn test_sub_task_inherits_parent_identity() {
        let task = EngagementTask::new(
            "user-1".to_string(),
            "acc-1".to_string(),
            "post-1".to_string(),
            Platform::Facebook,
            TargetScope::All,
            "gpt-4o-mini".to_string(),
            None,
        );
        let sub = EngagementSubTask::new(&task, "c1".to_string(), "nice shot!".to_string());
        assert_eq!(sub.task_id, task.id);
        assert_eq!(sub.post_id, "post-1");
        assert_eq!(sub.status, SubTaskStatus::Created);
    }
}
