//! In-memory reference implementation of [`TaskStore`] on sharded maps.
//! No lock is ever held across an await point; every operation works on a
//! single map entry.

use super::TaskStore;
use crate::error::{PubflowError, Result};
use crate::models::{
    EngagementStatus, EngagementSubTask, EngagementTask, MediaContainer, MediaProcessingStatus,
    Platform, PublishStatus, PublishTask, SubTaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    publish_tasks: DashMap<Uuid, PublishTask>,
    media_containers: DashMap<Uuid, MediaContainer>,
    engagement_tasks: DashMap<Uuid, EngagementTask>,
    sub_tasks: DashMap<Uuid, EngagementSubTask>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch_task(task: &mut PublishTask) {
        task.updated_at = Utc::now();
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_publish_task(&self, task: PublishTask) -> Result<()> {
        if self.publish_tasks.contains_key(&task.id) {
            return Err(PubflowError::StoreError(format!(
                "publish task {} already exists",
                task.id
            )));
        }
        self.publish_tasks.insert(task.id, task);
        Ok(())
    }

    async fn publish_task(&self, id: Uuid) -> Result<Option<PublishTask>> {
        Ok(self.publish_tasks.get(&id).map(|t| t.clone()))
    }

    async fn delete_publish_task(&self, id: Uuid, user_id: &str) -> Result<bool> {
        let removed = self
            .publish_tasks
            .remove_if(&id, |_, task| task.user_id == user_id);
        Ok(removed.is_some())
    }

    async fn due_publish_tasks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PublishTask>> {
        let mut due: Vec<PublishTask> = self
            .publish_tasks
            .iter()
            .filter(|t| {
                t.status == PublishStatus::WaitingForPublish
                    && t.publish_time >= start
                    && t.publish_time <= end
            })
            .map(|t| t.clone())
            .collect();
        due.sort_by_key(|t| t.publish_time);
        Ok(due)
    }

    async fn list_publish_tasks(&self, user_id: &str) -> Result<Vec<PublishTask>> {
        let mut tasks: Vec<PublishTask> = self
            .publish_tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn transition_publish_status(
        &self,
        id: Uuid,
        expected: &[PublishStatus],
        to: PublishStatus,
        error_msg: Option<String>,
    ) -> Result<bool> {
        match self.publish_tasks.get_mut(&id) {
            Some(mut task) => {
                if !expected.contains(&task.status) {
                    return Ok(false);
                }
                task.status = to;
                if error_msg.is_some() {
                    task.error_msg = error_msg;
                }
                Self::touch_task(&mut task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_in_queue(&self, id: Uuid, in_queue: bool) -> Result<()> {
        if let Some(mut task) = self.publish_tasks.get_mut(&id) {
            task.in_queue = in_queue;
            Self::touch_task(&mut task);
        }
        Ok(())
    }

    async fn set_publish_time(&self, id: Uuid, publish_time: DateTime<Utc>) -> Result<bool> {
        match self.publish_tasks.get_mut(&id) {
            Some(mut task) => {
                task.publish_time = publish_time;
                Self::touch_task(&mut task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_platform_item(&self, id: Uuid, platform_item_id: &str) -> Result<()> {
        if let Some(mut task) = self.publish_tasks.get_mut(&id) {
            task.platform_item_id = Some(platform_item_id.to_string());
            Self::touch_task(&mut task);
        }
        Ok(())
    }

    async fn complete_publish_task(
        &self,
        id: Uuid,
        platform_item_id: Option<&str>,
        work_link: Option<&str>,
    ) -> Result<bool> {
        match self.publish_tasks.get_mut(&id) {
            Some(mut task) => {
                if !task.status.is_dispatchable() {
                    return Ok(false);
                }
                task.status = PublishStatus::Published;
                if let Some(item) = platform_item_id {
                    task.platform_item_id = Some(item.to_string());
                }
                if let Some(link) = work_link {
                    task.work_link = Some(link.to_string());
                }
                Self::touch_task(&mut task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_platform_item(
        &self,
        platform: Platform,
        platform_item_id: &str,
    ) -> Result<Option<PublishTask>> {
        Ok(self
            .publish_tasks
            .iter()
            .find(|t| {
                t.platform == platform && t.platform_item_id.as_deref() == Some(platform_item_id)
            })
            .map(|t| t.clone()))
    }

    async fn increment_staging_cycles(&self, id: Uuid) -> Result<u32> {
        match self.publish_tasks.get_mut(&id) {
            Some(mut task) => {
                task.staging_cycles += 1;
                Self::touch_task(&mut task);
                Ok(task.staging_cycles)
            }
            None => Err(PubflowError::StoreError(format!(
                "publish task {id} not found"
            ))),
        }
    }

    async fn create_media_container(&self, container: MediaContainer) -> Result<()> {
        self.media_containers.insert(container.id, container);
        Ok(())
    }

    async fn media_containers(&self, task_id: Uuid) -> Result<Vec<MediaContainer>> {
        let mut containers: Vec<MediaContainer> = self
            .media_containers
            .iter()
            .filter(|c| c.task_id == task_id)
            .map(|c| c.clone())
            .collect();
        containers.sort_by_key(|c| c.created_at);
        Ok(containers)
    }

    async fn update_media_status(
        &self,
        container_id: Uuid,
        status: MediaProcessingStatus,
    ) -> Result<()> {
        if let Some(mut container) = self.media_containers.get_mut(&container_id) {
            container.status = status;
            container.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_engagement_task(&self, task: EngagementTask) -> Result<()> {
        self.engagement_tasks.insert(task.id, task);
        Ok(())
    }

    async fn engagement_task(&self, id: Uuid) -> Result<Option<EngagementTask>> {
        Ok(self.engagement_tasks.get(&id).map(|t| t.clone()))
    }

    async fn update_engagement_status(&self, id: Uuid, status: EngagementStatus) -> Result<()> {
        if let Some(mut task) = self.engagement_tasks.get_mut(&id) {
            task.status = status;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_total_sub_tasks(&self, id: Uuid, count: u32) -> Result<()> {
        if let Some(mut task) = self.engagement_tasks.get_mut(&id) {
            task.total_sub_tasks += count;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_completed_sub_tasks(&self, id: Uuid) -> Result<()> {
        if let Some(mut task) = self.engagement_tasks.get_mut(&id) {
            task.completed_sub_tasks += 1;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_failed_sub_tasks(&self, id: Uuid) -> Result<()> {
        if let Some(mut task) = self.engagement_tasks.get_mut(&id) {
            task.failed_sub_tasks += 1;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_sub_task(&self, sub_task: EngagementSubTask) -> Result<()> {
        self.sub_tasks.insert(sub_task.id, sub_task);
        Ok(())
    }

    async fn sub_task(&self, id: Uuid) -> Result<Option<EngagementSubTask>> {
        Ok(self.sub_tasks.get(&id).map(|t| t.clone()))
    }

    async fn sub_tasks_for_task(&self, task_id: Uuid) -> Result<Vec<EngagementSubTask>> {
        let mut subs: Vec<EngagementSubTask> = self
            .sub_tasks
            .iter()
            .filter(|s| s.task_id == task_id)
            .map(|s| s.clone())
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn update_sub_task_status(&self, id: Uuid, status: SubTaskStatus) -> Result<()> {
        if let Some(mut sub) = self.sub_tasks.get_mut(&id) {
            sub.status = status;
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn has_completed_sub_task(&self, post_id: &str, comment_id: &str) -> Result<bool> {
        Ok(self.sub_tasks.iter().any(|s| {
            s.post_id == post_id && s.comment_id == comment_id && s.status == SubTaskStatus::Completed
        }))
    }
}
