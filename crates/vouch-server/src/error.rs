use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use vouch_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// The metadata service was unreachable or returned garbage; the caller
    /// may retry.
    #[error("{0}")]
    Upstream(String),

    #[error("Avatar storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Avatar storage error".to_string(),
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("Not found".to_string()),
            StoreError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
