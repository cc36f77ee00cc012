use super::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Processing states reported by platforms with asynchronous media
/// ingestion. A task's final publish call is gated on every container
/// reaching `Finished`; any `Failed` container fails the task without
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaProcessingStatus {
    Created,
    InProgress,
    Finished,
    Failed,
}

impl MediaProcessingStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for MediaProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Content category of the staged media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCategory {
    Post,
    Story,
    Reel,
}

/// Media sub-type within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Plain,
}

/// One staged media resource belonging to a publish task. Containers are
/// never deleted; they remain as the audit trail of the publish attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaContainer {
    pub id: Uuid,
    /// Owning publish task
    pub task_id: Uuid,
    pub account_id: String,
    pub platform: Platform,
    /// Platform-assigned processing-job identity
    pub container_ref: String,
    pub category: PostCategory,
    pub kind: MediaKind,
    pub status: MediaProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaContainer {
    pub fn new(
        task_id: Uuid,
        account_id: String,
        platform: Platform,
        container_ref: String,
        category: PostCategory,
        kind: MediaKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            account_id,
            platform,
            container_ref,
            category,
            kind,
            status: MediaProcessingStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        assert!(MediaProcessingStatus::Finished.is_settled());
        assert!(MediaProcessingStatus::Failed.is_settled());
        assert!(!MediaProcessingStatus::Created.is_settled());
        assert!(!MediaProcessingStatus::InProgress.is_settled());
    }
}
