//! # Platform Adapter Contract
//!
//! Every platform integration implements [`PlatformAdapter`]: a cheap
//! auth probe plus one `execute` attempt. Single-call platforms complete
//! the publish inside `execute`; staged platforms only start or advance
//! media staging and report `Publishing`, with completion driven by a
//! later queue redelivery or a webhook.

mod registry;

pub use registry::AdapterRegistry;

use crate::models::{PublishStatus, PublishTask};
use async_trait::async_trait;
use std::time::Duration;

/// Errors surfaced by adapter operations, classified so the queue retry
/// policy can distinguish transient outages from permanent rejections.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Platform call timed out")]
    Timeout,

    #[error("Account authorization expired")]
    AuthExpired { retry_after: Option<Duration> },

    #[error("Platform rejected the content: {0}")]
    Rejected(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl AdapterError {
    /// Permanent errors must not be retried regardless of the remaining
    /// retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Unsupported(_))
    }
}

/// Result of the auth probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Ok,
    Expired,
}

#[derive(Debug, Clone)]
pub struct AuthProbe {
    pub status: AuthStatus,
    pub retry_after: Option<Duration>,
}

impl AuthProbe {
    pub fn ok() -> Self {
        Self {
            status: AuthStatus::Ok,
            retry_after: None,
        }
    }

    pub fn expired(retry_after: Option<Duration>) -> Self {
        Self {
            status: AuthStatus::Expired,
            retry_after,
        }
    }
}

/// Outcome of one `execute` attempt.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub status: PublishStatus,
    pub message: String,
    /// Marks a failure as permanent; the queue must not redeliver.
    pub no_retry: bool,
    /// Platform-assigned identifier of the published item, when the
    /// attempt produced one.
    pub platform_item_id: Option<String>,
    /// Externally visible permalink, when the platform returns one.
    pub work_link: Option<String>,
}

impl ExecuteOutcome {
    pub fn published(message: impl Into<String>) -> Self {
        Self {
            status: PublishStatus::Published,
            message: message.into(),
            no_retry: false,
            platform_item_id: None,
            work_link: None,
        }
    }

    /// Staging started or still in progress; a later delivery re-checks.
    pub fn publishing(message: impl Into<String>) -> Self {
        Self {
            status: PublishStatus::Publishing,
            message: message.into(),
            no_retry: false,
            platform_item_id: None,
            work_link: None,
        }
    }

    pub fn failed(message: impl Into<String>, no_retry: bool) -> Self {
        Self {
            status: PublishStatus::Failed,
            message: message.into(),
            no_retry,
            platform_item_id: None,
            work_link: None,
        }
    }

    pub fn with_platform_item(mut self, platform_item_id: impl Into<String>) -> Self {
        self.platform_item_id = Some(platform_item_id.into());
        self
    }

    pub fn with_work_link(mut self, work_link: impl Into<String>) -> Self {
        self.work_link = Some(work_link.into());
        self
    }
}

/// The per-platform publish execution contract. `check_auth` never
/// mutates state; `execute` performs exactly one attempt.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform tag this adapter serves, used as the registry key.
    fn platform(&self) -> crate::models::Platform;

    /// Cheap capability probe for the account's authorization.
    async fn check_auth(&self, account_id: &str) -> Result<AuthProbe, AdapterError>;

    /// Perform one publish attempt. Staged platforms return
    /// `Publishing` until all media containers are finished.
    async fn execute(&self, task: &PublishTask) -> Result<ExecuteOutcome, AdapterError>;
}
