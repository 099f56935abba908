use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Why an authentication attempt was turned away. Serialized into the 401
/// body so clients and logs can tell the cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    MissingCredential,
    InvalidCredential,
    NotAdmin,
}

impl AuthFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailureReason::MissingCredential => "missing_credential",
            AuthFailureReason::InvalidCredential => "invalid_credential",
            AuthFailureReason::NotAdmin => "not_admin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated: {}", .0.as_str())]
    NotAuthenticated(AuthFailureReason),
    #[error("not authorized")]
    NotAuthorized,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotAuthenticated(reason) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized", "reason": reason.as_str() })),
            )
                .into_response(),
            ApiError::NotAuthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
            }
            ApiError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(cause) => {
                // The cause stays in the logs, the client gets a generic body.
                error!("Internal error while handling request: {:#}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
