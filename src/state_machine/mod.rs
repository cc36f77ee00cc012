//! # Publish State Machine
//!
//! Enforces the monotone publish lifecycle
//! `WaitingForPublish -> Publishing -> {Published, Failed}` on top of the
//! store's compare-and-set primitive. Both completion paths (worker poll
//! result and out-of-band webhook) funnel through the same terminal-apply
//! operations, so replays and late results are no-ops rather than errors:
//! the first terminal write wins.

mod events;

pub use events::PublishEvent;

use crate::error::Result;
use crate::models::PublishStatus;
use crate::store::TaskStore;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: PublishStatus, event: String },
}

/// Outcome of an attempted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied and persisted
    Applied(PublishStatus),
    /// The task was missing, already terminal, or changed concurrently;
    /// nothing was written
    Ignored,
}

impl TransitionOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub struct PublishStateMachine {
    store: Arc<dyn TaskStore>,
}

impl PublishStateMachine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Pure transition table. Every edge not listed here is invalid.
    pub fn determine_target_state(
        current: PublishStatus,
        event: &PublishEvent,
    ) -> std::result::Result<PublishStatus, StateMachineError> {
        let target = match (current, event) {
            (PublishStatus::WaitingForPublish, PublishEvent::Dispatch) => PublishStatus::Publishing,
            // Queue redelivery of a staged task re-enters Publishing
            (PublishStatus::Publishing, PublishEvent::Dispatch) => PublishStatus::Publishing,
            (PublishStatus::Publishing, PublishEvent::Complete { .. }) => PublishStatus::Published,
            (PublishStatus::Publishing, PublishEvent::Fail { .. }) => PublishStatus::Failed,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from,
                    event: event.name().to_string(),
                })
            }
        };
        Ok(target)
    }

    /// Mark a task as actively publishing. Idempotent: a task already in
    /// `Publishing` stays there, a terminal task is left untouched.
    pub async fn begin_publishing(&self, task_id: Uuid) -> Result<TransitionOutcome> {
        let applied = self
            .store
            .transition_publish_status(
                task_id,
                &[PublishStatus::WaitingForPublish, PublishStatus::Publishing],
                PublishStatus::Publishing,
                None,
            )
            .await?;
        if applied {
            Ok(TransitionOutcome::Applied(PublishStatus::Publishing))
        } else {
            debug!(task_id = %task_id, "begin_publishing ignored, task missing or terminal");
            Ok(TransitionOutcome::Ignored)
        }
    }

    /// Terminal success. First terminal write wins; later calls are no-ops.
    /// A missing platform item id leaves whatever the task already
    /// recorded at staging time.
    pub async fn complete(
        &self,
        task_id: Uuid,
        platform_item_id: Option<&str>,
        work_link: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let applied = self
            .store
            .complete_publish_task(task_id, platform_item_id, work_link)
            .await?;
        if applied {
            Ok(TransitionOutcome::Applied(PublishStatus::Published))
        } else {
            debug!(task_id = %task_id, "complete ignored, task missing or already terminal");
            Ok(TransitionOutcome::Ignored)
        }
    }

    /// Terminal failure. First terminal write wins; later calls are no-ops.
    pub async fn fail(&self, task_id: Uuid, message: &str) -> Result<TransitionOutcome> {
        let applied = self
            .store
            .transition_publish_status(
                task_id,
                &[PublishStatus::WaitingForPublish, PublishStatus::Publishing],
                PublishStatus::Failed,
                Some(message.to_string()),
            )
            .await?;
        if applied {
            Ok(TransitionOutcome::Applied(PublishStatus::Failed))
        } else {
            debug!(task_id = %task_id, "fail ignored, task missing or already terminal");
            Ok(TransitionOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountInfo, Platform, PostContent, PublishTask};
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn machine_with_task() -> (PublishStateMachine, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let account = AccountInfo {
            account_id: "acc-1".to_string(),
            uid: "ext-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let task = PublishTask::new(
            &account,
            Platform::Youtube,
            PostContent::default(),
            Utc::now(),
        );
        let id = task.id;
        store.create_publish_task(task).await.unwrap();
        (PublishStateMachine::new(store.clone()), store, id)
    }

    #[test]
    fn test_transition_table_valid_edges() {
        assert_eq!(
            PublishStateMachine::determine_target_state(
                PublishStatus::WaitingForPublish,
                &PublishEvent::Dispatch
            )
            .unwrap(),
            PublishStatus::Publishing
        );
        assert_eq!(
            PublishStateMachine::determine_target_state(
                PublishStatus::Publishing,
                &PublishEvent::Complete {
                    platform_item_id: "x".to_string(),
                    work_link: None
                }
            )
            .unwrap(),
            PublishStatus::Published
        );
        assert_eq!(
            PublishStateMachine::determine_target_state(
                PublishStatus::Publishing,
                &PublishEvent::Fail {
                    message: "boom".to_string(),
                    no_retry: true
                }
            )
            .unwrap(),
            PublishStatus::Failed
        );
    }

    #[test]
    fn test_transition_table_rejects_terminal_edges() {
        assert!(PublishStateMachine::determine_target_state(
            PublishStatus::Published,
            &PublishEvent::Dispatch
        )
        .is_err());
        assert!(PublishStateMachine::determine_target_state(
            PublishStatus::Failed,
            &PublishEvent::Complete {
                platform_item_id: "x".to_string(),
                work_link: None
            }
        )
        .is_err());
        // Completing a task that was never dispatched is invalid.
        assert!(PublishStateMachine::determine_target_state(
            PublishStatus::WaitingForPublish,
            &PublishEvent::Complete {
                platform_item_id: "x".to_string(),
                work_link: None
            }
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_first_terminal_write_wins() {
        let (machine, _store, id) = machine_with_task().await;

        assert!(machine.begin_publishing(id).await.unwrap().was_applied());
        assert!(machine
            .complete(id, Some("item-1"), None)
            .await
            .unwrap()
            .was_applied());

        // A late failure report must not overwrite the published state.
        assert_eq!(
            machine.fail(id, "late failure").await.unwrap(),
            TransitionOutcome::Ignored
        );
        // Nor can a replayed completion change anything.
        assert_eq!(
            machine.complete(id, Some("item-2"), None).await.unwrap(),
            TransitionOutcome::Ignored
        );
    }
}
