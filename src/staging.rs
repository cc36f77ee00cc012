//! # Media Staging
//!
//! Sub-protocol for platforms that separate "ingest media" from
//! "publish". On the first delivery of a task its adapter registers one
//! [`MediaContainer`] per media item and reports `Publishing`; each later
//! delivery polls the unfinished containers through a [`MediaProbe`] and
//! only when every container is `Finished` may the adapter issue the
//! final publish call. A `Failed` container fails the task without
//! retry.
//!
//! Progress lives in the store, not in memory, so a staged publish
//! survives process restarts; a worker never blocks waiting for
//! platform-side processing.

use crate::adapters::AdapterError;
use crate::error::Result;
use crate::models::{MediaContainer, MediaKind, MediaProcessingStatus, Platform, PostCategory};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One media item to stage, described by the adapter.
#[derive(Debug, Clone)]
pub struct StagedItem {
    /// Platform-assigned processing-job identity
    pub container_ref: String,
    pub category: PostCategory,
    pub kind: MediaKind,
}

/// Platform-side processing status lookup, implemented by the platform
/// integration. Never mutates platform state.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe_status(
        &self,
        container: &MediaContainer,
    ) -> std::result::Result<MediaProcessingStatus, AdapterError>;
}

/// Aggregate staging state after a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingProgress {
    /// Every container is `Finished`; the final publish call may go out
    AllFinished,
    /// At least one container is still processing
    InProgress { finished: usize, total: usize },
    /// A container failed; the task cannot be salvaged
    Failed { container_ref: String },
}

/// Container registration and poll cycles on top of the task store.
pub struct MediaStaging {
    store: Arc<dyn TaskStore>,
}

impl MediaStaging {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Record one container per staged media item. Called by an adapter
    /// on the first delivery of a task, after the platform accepted the
    /// uploads.
    pub async fn register(
        &self,
        task_id: Uuid,
        account_id: &str,
        platform: Platform,
        items: Vec<StagedItem>,
    ) -> Result<usize> {
        let count = items.len();
        for item in items {
            let container = MediaContainer::new(
                task_id,
                account_id.to_string(),
                platform,
                item.container_ref,
                item.category,
                item.kind,
            );
            self.store.create_media_container(container).await?;
        }
        info!(task_id = %task_id, containers = count, "registered staged media containers");
        Ok(count)
    }

    /// One poll cycle: refresh every unsettled container through the
    /// probe and report the aggregate state. A probe error on one
    /// container leaves it unsettled for the next cycle rather than
    /// aborting the pass.
    pub async fn poll(&self, task_id: Uuid, probe: &dyn MediaProbe) -> Result<StagingProgress> {
        let containers = self.store.media_containers(task_id).await?;
        let total = containers.len();
        let mut finished = 0;

        for container in &containers {
            let status = if container.status.is_settled() {
                container.status
            } else {
                match probe.probe_status(container).await {
                    Ok(status) => {
                        if status != container.status {
                            self.store.update_media_status(container.id, status).await?;
                            debug!(
                                task_id = %task_id,
                                container_ref = %container.container_ref,
                                status = %status,
                                "media container status updated"
                            );
                        }
                        status
                    }
                    Err(e) => {
                        warn!(
                            task_id = %task_id,
                            container_ref = %container.container_ref,
                            error = %e,
                            "media status probe failed, will re-check next cycle"
                        );
                        container.status
                    }
                }
            };

            match status {
                MediaProcessingStatus::Failed => {
                    return Ok(StagingProgress::Failed {
                        container_ref: container.container_ref.clone(),
                    });
                }
                MediaProcessingStatus::Finished => finished += 1,
                _ => {}
            }
        }

        if total > 0 && finished == total {
            Ok(StagingProgress::AllFinished)
        } else {
            Ok(StagingProgress::InProgress { finished, total })
        }
    }

    /// Whether this task has staged containers at all. Adapters use this
    /// to tell a first delivery from a poll redelivery.
    pub async fn has_containers(&self, task_id: Uuid) -> Result<bool> {
        Ok(!self.store.media_containers(task_id).await?.is_empty())
    }
}

/// Human-readable partial-progress diagnostic, used when the poll cycle
/// budget runs out: names the containers that finished and the ones that
/// did not.
pub async fn progress_summary(store: &dyn TaskStore, task_id: Uuid) -> Result<String> {
    let containers = store.media_containers(task_id).await?;
    let finished: Vec<&str> = containers
        .iter()
        .filter(|c| c.status == MediaProcessingStatus::Finished)
        .map(|c| c.container_ref.as_str())
        .collect();
    let unfinished: Vec<&str> = containers
        .iter()
        .filter(|c| c.status != MediaProcessingStatus::Finished)
        .map(|c| c.container_ref.as_str())
        .collect();
    Ok(format!(
        "finished containers: [{}], unfinished containers: [{}]",
        finished.join(", "),
        unfinished.join(", ")
    ))
}
