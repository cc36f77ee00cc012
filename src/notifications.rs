//! # Lifecycle Notifications
//!
//! Explicit, typed notifications delivered to a registered handler set.
//! Handlers are registered at wiring time and invoked in order. There is
//! no global broadcast bus: causality stays traceable from the emitting
//! component to its handlers.

use crate::models::{EngagementStatus, Platform, PublishStatus};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Typed lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PublishTaskEnqueued {
        task_id: Uuid,
        platform: Platform,
    },
    PublishStatusChanged {
        task_id: Uuid,
        platform: Platform,
        status: PublishStatus,
    },
    EngagementStatusChanged {
        task_id: Uuid,
        status: EngagementStatus,
    },
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, notification: &Notification);

    /// Handler name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Ordered set of notification handlers.
#[derive(Clone, Default)]
pub struct NotificationHub {
    handlers: Vec<Arc<dyn NotificationHandler>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub async fn notify(&self, notification: Notification) {
        for handler in &self.handlers {
            handler.handle(&notification).await;
        }
        if self.handlers.is_empty() {
            tracing::trace!(?notification, "notification dropped, no handlers registered");
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("NotificationHub")
            .field("handlers", &names)
            .finish()
    }
}

/// Handler that logs every notification at info level. Used as the default
/// observer in development wiring.
pub struct LoggingHandler;

#[async_trait]
impl NotificationHandler for LoggingHandler {
    async fn handle(&self, notification: &Notification) {
        match notification {
            Notification::PublishTaskEnqueued { task_id, platform } => {
                tracing::info!(task_id = %task_id, platform = %platform, "publish task enqueued");
            }
            Notification::PublishStatusChanged {
                task_id,
                platform,
                status,
            } => {
                tracing::info!(task_id = %task_id, platform = %platform, status = %status, "publish status changed");
            }
            Notification::EngagementStatusChanged { task_id, status } => {
                tracing::info!(task_id = %task_id, status = %status, "engagement status changed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationHandler for Recorder {
        async fn handle(&self, notification: &Notification) {
            self.seen.lock().push(notification.clone());
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_all_handlers_receive_notification() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let hub = NotificationHub::new()
            .with_handler(recorder.clone())
            .with_handler(Arc::new(LoggingHandler));

        hub.notify(Notification::PublishTaskEnqueued {
            task_id: Uuid::new_v4(),
            platform: Platform::Twitter,
        })
        .await;

        assert_eq!(hub.handler_count(), 2);
        assert_eq!(recorder.seen.lock().len(), 1);
    }
}
