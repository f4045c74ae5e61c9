use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use devhub_core::gateway::GatewayErrorKind;
use devhub_core::DevhubError;

/// Sentinel carrying an explicit 404 through the `anyhow::Error` chain.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. Body: `{"error": message}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(DevhubError::Validation(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

fn status_for(err: &DevhubError) -> StatusCode {
    match err {
        DevhubError::Validation(_) | DevhubError::SlotUnavailable(_) => StatusCode::BAD_REQUEST,
        DevhubError::ProjectLimitReached(_) => StatusCode::CONFLICT,
        DevhubError::RemoteRejected(e) => match e.kind {
            GatewayErrorKind::NotFound => StatusCode::NOT_FOUND,
            GatewayErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            GatewayErrorKind::Conflict => StatusCode::CONFLICT,
            GatewayErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayErrorKind::Unknown => StatusCode::BAD_GATEWAY,
        },
        DevhubError::TimeoutExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        DevhubError::ReplaceTargetMissing(_)
        | DevhubError::DuplicateId(_)
        | DevhubError::Io(_)
        | DevhubError::Yaml(_)
        | DevhubError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }

        let status = self
            .0
            .downcast_ref::<DevhubError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
