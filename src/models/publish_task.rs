use super::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Publish lifecycle states. Transitions are monotone along
/// `WaitingForPublish -> Publishing -> {Published, Failed}`; the two
/// terminal states admit no further transitions except the webhook-driven
/// correction of a still-`Publishing` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Created and waiting for its target time
    WaitingForPublish,
    /// Dispatched at least once; staged platforms stay here while media
    /// processing completes
    Publishing,
    /// Content is live on the platform
    Published,
    /// Publish failed; `error_msg` carries the diagnostic
    Failed,
}

impl PublishStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    /// States in which a dispatch-queue delivery is still meaningful.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::WaitingForPublish | Self::Publishing)
    }
}

impl Default for PublishStatus {
    fn default() -> Self {
        Self::WaitingForPublish
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForPublish => write!(f, "waiting_for_publish"),
            Self::Publishing => write!(f, "publishing"),
            Self::Published => write!(f, "published"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_for_publish" => Ok(Self::WaitingForPublish),
            "publishing" => Ok(Self::Publishing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid publish status: {s}")),
        }
    }
}

/// Content payload for one publish task. Platform-specific knobs ride in
/// `options` as opaque JSON interpreted by the owning adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub image_urls: Vec<String>,
    pub video_url: Option<String>,
    pub options: serde_json::Value,
}

impl PostContent {
    /// Assemble the caption: description followed by `#topic` suffixes.
    pub fn caption(&self) -> String {
        let description = self.description.as_deref().unwrap_or("");
        if self.topics.is_empty() {
            return description.to_string();
        }
        let tags = format!("#{}", self.topics.join(" #"));
        if description.is_empty() {
            tags
        } else {
            format!("{description} {tags}")
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_url.is_some()
    }

    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }
}

/// One scheduled content-delivery request to one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTask {
    pub id: Uuid,
    pub user_id: String,
    /// External identifier of the account on its platform
    pub uid: String,
    pub account_id: String,
    pub platform: Platform,
    pub content: PostContent,
    pub publish_time: DateTime<Utc>,
    pub status: PublishStatus,
    /// Dedup key for the dispatch queue, generated once at creation
    pub queue_id: String,
    /// Whether a not-yet-consumed queue entry exists for this task
    pub in_queue: bool,
    pub error_msg: Option<String>,
    /// Platform-assigned publish identifier, recorded at staging time and
    /// used by the webhook receiver to resolve the owning task
    pub platform_item_id: Option<String>,
    /// Externally visible link to the published post
    pub work_link: Option<String>,
    /// Staging poll deliveries consumed so far
    pub staging_cycles: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishTask {
    pub fn new(
        account: &AccountInfo,
        platform: Platform,
        content: PostContent,
        publish_time: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            user_id: account.user_id.clone(),
            uid: account.uid.clone(),
            account_id: account.account_id.clone(),
            platform,
            content,
            publish_time,
            status: PublishStatus::WaitingForPublish,
            queue_id: format!("publish:{platform}:{id}"),
            in_queue: false,
            error_msg: None,
            platform_item_id: None,
            work_link: None,
            staging_cycles: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Account lookup result supplied by the account collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub uid: String,
    pub user_id: String,
}
