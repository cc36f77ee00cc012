//! # Webhook Receiver
//!
//! Entry point for platforms that confirm publish success or failure
//! asynchronously out-of-band. A payload is resolved to its owning task
//! by the platform-assigned publish identifier recorded at staging time,
//! never by queue identity, and the correction goes through the same
//! first-terminal-write-wins operations the worker uses. Replays,
//! unknown identifiers and already-terminal tasks are all safe no-ops.

use crate::error::Result;
use crate::models::{Platform, PublishStatus};
use crate::notifications::{Notification, NotificationHub};
use crate::queue::{CancelOutcome, DispatchQueue};
use crate::state_machine::PublishStateMachine;
use crate::store::TaskStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw platform callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    /// Platform-assigned publish identifier recorded on the task
    pub platform_publish_id: String,
    pub account_external_id: String,
    /// Failure reason, present on failure events
    pub reason: Option<String>,
    /// Externally visible post identifier, present once the post is
    /// publicly available
    pub post_id: Option<String>,
}

/// Recognized event kinds. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Failed,
    Complete,
    InboxDelivered,
    PubliclyAvailable,
}

impl EventKind {
    fn parse(event: &str) -> Option<Self> {
        match event {
            "post.publish.failed" | "failed" => Some(Self::Failed),
            "post.publish.complete" | "complete" => Some(Self::Complete),
            "post.publish.inbox_delivered" | "inbox_delivered" => Some(Self::InboxDelivered),
            "post.publish.publicly_available" | "publicly_available" => {
                Some(Self::PubliclyAvailable)
            }
            _ => None,
        }
    }
}

/// What a received webhook did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Applied(PublishStatus),
    /// Unknown event, unknown task, or the task was already terminal
    Ignored,
}

pub struct WebhookReceiver {
    store: Arc<dyn TaskStore>,
    queue: Arc<DispatchQueue>,
    machine: PublishStateMachine,
    hub: NotificationHub,
}

impl WebhookReceiver {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<DispatchQueue>,
        hub: NotificationHub,
    ) -> Self {
        let machine = PublishStateMachine::new(store.clone());
        Self {
            store,
            queue,
            machine,
            hub,
        }
    }

    /// Apply one platform callback. Idempotent end to end.
    pub async fn receive(
        &self,
        platform: Platform,
        payload: WebhookPayload,
    ) -> Result<ReceiptOutcome> {
        let Some(kind) = EventKind::parse(&payload.event) else {
            warn!(platform = %platform, event = %payload.event, "unrecognized webhook event, ignoring");
            return Ok(ReceiptOutcome::Ignored);
        };

        let Some(task) = self
            .store
            .find_by_platform_item(platform, &payload.platform_publish_id)
            .await?
        else {
            debug!(
                platform = %platform,
                platform_publish_id = %payload.platform_publish_id,
                "webhook for unknown publish id, ignoring"
            );
            return Ok(ReceiptOutcome::Ignored);
        };

        let applied = match kind {
            EventKind::Failed => {
                let reason = payload
                    .reason
                    .as_deref()
                    .unwrap_or("platform reported publish failure");
                let outcome = self.machine.fail(task.id, reason).await?;
                outcome
                    .was_applied()
                    .then_some(PublishStatus::Failed)
            }
            EventKind::Complete | EventKind::InboxDelivered => {
                let outcome = self
                    .machine
                    .complete(task.id, Some(&payload.platform_publish_id), None)
                    .await?;
                outcome
                    .was_applied()
                    .then_some(PublishStatus::Published)
            }
            EventKind::PubliclyAvailable => {
                // The publicly visible id supersedes the staging-time one.
                let item_id = payload
                    .post_id
                    .as_deref()
                    .unwrap_or(&payload.platform_publish_id);
                let outcome = self.machine.complete(task.id, Some(item_id), None).await?;
                outcome
                    .was_applied()
                    .then_some(PublishStatus::Published)
            }
        };

        let Some(status) = applied else {
            debug!(task_id = %task.id, event = %payload.event, "webhook replay on terminal task, no-op");
            return Ok(ReceiptOutcome::Ignored);
        };

        self.remove_queue_entry(&task.queue_id);
        self.store.set_in_queue(task.id, false).await?;
        self.hub
            .notify(Notification::PublishStatusChanged {
                task_id: task.id,
                platform: task.platform,
                status,
            })
            .await;
        info!(
            task_id = %task.id,
            platform = %platform,
            event = %payload.event,
            status = %status,
            "webhook applied terminal status"
        );
        Ok(ReceiptOutcome::Applied(status))
    }

    /// Drop any pending queue entry for the now-terminal task. An active
    /// entry is left alone; the worker's dispatchability check makes its
    /// delivery a no-op. A missing entry is equally fine.
    fn remove_queue_entry(&self, queue_id: &str) {
        match self.queue.cancel_if_pending(queue_id) {
            CancelOutcome::Cancelled => {
                debug!(queue_id = %queue_id, "removed stale queue entry after webhook");
            }
            CancelOutcome::NotFound => {}
            CancelOutcome::Active => {
                debug!(queue_id = %queue_id, "queue entry active, delivery will observe terminal state");
            }
        }
    }
}
