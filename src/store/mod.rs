//! # Task Store
//!
//! The store is the only shared mutable resource in the engine. All
//! mutation goes through narrow, idempotent operations (compare-and-set
//! status transitions, counter increments) rather than read-modify-write
//! of whole records, so concurrent delivery of stale and fresh jobs for
//! the same task cannot corrupt state.
//!
//! Persistence mechanics are out of scope; [`MemoryStore`] is the
//! reference implementation used in-process and under test.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{
    EngagementStatus, EngagementSubTask, EngagementTask, MediaContainer, MediaProcessingStatus,
    Platform, PublishStatus, PublishTask, SubTaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable records for publish tasks, media containers and engagement
/// tasks/sub-tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // --- publish tasks ---

    async fn create_publish_task(&self, task: PublishTask) -> Result<()>;

    async fn publish_task(&self, id: Uuid) -> Result<Option<PublishTask>>;

    /// Delete a task owned by `user_id`. Returns whether a record was
    /// removed. Callers must cancel any pending queue entry first.
    async fn delete_publish_task(&self, id: Uuid, user_id: &str) -> Result<bool>;

    /// Tasks still waiting whose target time falls within `[start, end]`,
    /// ordered by target time.
    async fn due_publish_tasks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PublishTask>>;

    async fn list_publish_tasks(&self, user_id: &str) -> Result<Vec<PublishTask>>;

    /// Compare-and-set status transition. The transition is applied only
    /// when the current status is one of `expected`; returns whether it
    /// was applied. This is the idempotence primitive every worker and
    /// webhook path relies on.
    async fn transition_publish_status(
        &self,
        id: Uuid,
        expected: &[PublishStatus],
        to: PublishStatus,
        error_msg: Option<String>,
    ) -> Result<bool>;

    async fn set_in_queue(&self, id: Uuid, in_queue: bool) -> Result<()>;

    async fn set_publish_time(&self, id: Uuid, publish_time: DateTime<Utc>) -> Result<bool>;

    /// Record the platform-assigned publish identifier used for webhook
    /// resolution.
    async fn set_platform_item(&self, id: Uuid, platform_item_id: &str) -> Result<()>;

    /// Terminal success: CAS from a dispatchable state to `Published`,
    /// recording the platform item id and permalink when given. A `None`
    /// leaves the stored value untouched.
    async fn complete_publish_task(
        &self,
        id: Uuid,
        platform_item_id: Option<&str>,
        work_link: Option<&str>,
    ) -> Result<bool>;

    async fn find_by_platform_item(
        &self,
        platform: Platform,
        platform_item_id: &str,
    ) -> Result<Option<PublishTask>>;

    /// Increment the staging poll-cycle counter, returning the new count.
    async fn increment_staging_cycles(&self, id: Uuid) -> Result<u32>;

    // --- media containers ---

    async fn create_media_container(&self, container: MediaContainer) -> Result<()>;

    async fn media_containers(&self, task_id: Uuid) -> Result<Vec<MediaContainer>>;

    async fn update_media_status(
        &self,
        container_id: Uuid,
        status: MediaProcessingStatus,
    ) -> Result<()>;

    // --- engagement ---

    async fn create_engagement_task(&self, task: EngagementTask) -> Result<()>;

    async fn engagement_task(&self, id: Uuid) -> Result<Option<EngagementTask>>;

    async fn update_engagement_status(&self, id: Uuid, status: EngagementStatus) -> Result<()>;

    async fn increment_total_sub_tasks(&self, id: Uuid, count: u32) -> Result<()>;

    async fn increment_completed_sub_tasks(&self, id: Uuid) -> Result<()>;

    async fn increment_failed_sub_tasks(&self, id: Uuid) -> Result<()>;

    async fn create_sub_task(&self, sub_task: EngagementSubTask) -> Result<()>;

    async fn sub_task(&self, id: Uuid) -> Result<Option<EngagementSubTask>>;

    async fn sub_tasks_for_task(&self, task_id: Uuid) -> Result<Vec<EngagementSubTask>>;

    async fn update_sub_task_status(&self, id: Uuid, status: SubTaskStatus) -> Result<()>;

    /// Whether a sub-task for `(post_id, comment_id)` has already reached
    /// `Completed`. Guards the idempotent re-run of "All" distribution.
    async fn has_completed_sub_task(&self, post_id: &str, comment_id: &str) -> Result<bool>;
}
