use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PubflowError {
    StoreError(String),
    StateTransitionError(String),
    AdapterError(String),
    QueueError(String),
    SchedulingError(String),
    EngagementError(String),
    ValidationError(String),
    ConfigurationError(String),
}

impl fmt::Display for PubflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PubflowError::StoreError(msg) => write!(f, "Store error: {msg}"),
            PubflowError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            PubflowError::AdapterError(msg) => write!(f, "Adapter error: {msg}"),
            PubflowError::QueueError(msg) => write!(f, "Queue error: {msg}"),
            PubflowError::SchedulingError(msg) => write!(f, "Scheduling error: {msg}"),
            PubflowError::EngagementError(msg) => write!(f, "Engagement error: {msg}"),
            PubflowError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            PubflowError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for PubflowError {}

pub type Result<T> = std::result::Result<T, PubflowError>;
