use serde::{Deserialize, Serialize};

/// Events that drive publish status transitions. Dispatch comes from the
/// queue worker; Complete and Fail come from adapter results, staging
/// polls or webhook confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PublishEvent {
    /// A queue delivery picked the task up for execution
    Dispatch,
    /// The platform confirmed the content is live
    Complete {
        platform_item_id: String,
        work_link: Option<String>,
    },
    /// The attempt ended in failure; `no_retry` marks it permanent
    Fail { message: String, no_retry: bool },
}

impl PublishEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
        }
    }
}
