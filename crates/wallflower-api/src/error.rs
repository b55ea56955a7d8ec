use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use wallflower_types::error::CoreError;

/// REST-facing wrapper for core errors. A `TooSoon` refusal carries the
/// concrete remaining wait, never a generic message.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self(CoreError::Storage(anyhow::anyhow!("task join: {}", e)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::NotAMember(_) | CoreError::NotAParticipant => StatusCode::FORBIDDEN,
            CoreError::TooSoon { .. } => StatusCode::LOCKED,
            CoreError::TransportUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Storage(e) => {
                error!("storage error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self.0 {
            CoreError::TooSoon { remaining } => serde_json::json!({
                "error": self.0.to_string(),
                "remaining_minutes": remaining.num_minutes().max(1),
            }),
            CoreError::Storage(_) => serde_json::json!({ "error": "internal error" }),
            _ => serde_json::json!({ "error": self.0.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
