//! # Data Model Layer
//!
//! Durable record types for publish tasks, staged media containers and
//! engagement tasks, together with their status enums. All mutation goes
//! through the narrow operations on [`crate::store::TaskStore`].

pub mod engagement;
pub mod media_container;
pub mod platform;
pub mod publish_task;

pub use engagement::{
    EngagementStatus, EngagementSubTask, EngagementTask, SubTaskStatus, TargetScope,
};
pub use media_container::{MediaContainer, MediaKind, MediaProcessingStatus, PostCategory};
pub use platform::Platform;
pub use publish_task::{AccountInfo, PostContent, PublishStatus, PublishTask};
