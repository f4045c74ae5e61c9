use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum DevhubError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("remote rejected the request: {0}")]
    RemoteRejected(#[from] GatewayError),

    #[error("remote did not respond within {deadline_ms}ms")]
    TimeoutExceeded { deadline_ms: u64 },

    #[error("replace target missing from store: {0}")]
    ReplaceTargetMissing(String),

    #[error("entity id already present in store: {0}")]
    DuplicateId(String),

    #[error("slot {0} is not available")]
    SlotUnavailable(u8),

    #[error("project limit reached: at most {0} projects per user")]
    ProjectLimitReached(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DevhubError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the error is meant to reach the person who triggered it.
    ///
    /// Store invariant violations indicate a bug and are only logged.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::ReplaceTargetMissing(_) | Self::DuplicateId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DevhubError>;
