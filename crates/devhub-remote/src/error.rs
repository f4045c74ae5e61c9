use devhub_core::gateway::{GatewayError, GatewayErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("remote url is not configured")]
    MissingUrl,
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("json error: {0}")]
    Serde(String),
    #[error("no matching row")]
    NoRows,
}

impl RemoteError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::Http { status, .. } => match status {
                401 | 403 => GatewayErrorKind::PermissionDenied,
                404 => GatewayErrorKind::NotFound,
                409 => GatewayErrorKind::Conflict,
                408 | 504 => GatewayErrorKind::Timeout,
                _ => GatewayErrorKind::Unknown,
            },
            Self::Timeout => GatewayErrorKind::Timeout,
            Self::NoRows => GatewayErrorKind::NotFound,
            Self::MissingUrl | Self::Transport(_) | Self::Serde(_) => GatewayErrorKind::Unknown,
        }
    }
}

impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        let kind = err.kind();
        let message = match err {
            RemoteError::Http { message, .. } => message,
            other => other.to_string(),
        };
        GatewayError::new(kind, message)
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_decode() {
        RemoteError::Serde(e.to_string())
    } else {
        RemoteError::Transport(e.to_string())
    }
}
