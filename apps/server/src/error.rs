//! HTTP-facing error types for the Order Sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use sync_server::ServerError;

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

/// Top-level API error. Wraps `sync_server::ServerError` and adds the
/// HTTP-only concerns (auth, malformed request bodies) the crate itself
/// has no business knowing about.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Server(ServerError::NotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Server(ServerError::UnknownEntityType(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
