use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::agent::ValidationError;
use crate::preview::{PreviewError, SUPPORTED_EXTENSIONS};
use crate::sandbox::SandboxError;
use crate::security::RateLimitError;

/// Request failures mapped to HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Sandbox(SandboxError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sandbox(SandboxError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Sandbox(_) => StatusCode::BAD_GATEWAY,
            ApiError::Preview(PreviewError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Preview(PreviewError::Unsupported { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Preview(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn body(&self) -> serde_json::Value {
        let message = self.to_string();
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => json!({
                "error": "validation",
                "message": message,
            }),
            ApiError::RateLimited(e) => json!({
                "error": "rate_limited",
                "message": message,
                "limit": e.limit,
                "window_secs": e.window_secs(),
            }),
            ApiError::Sandbox(e) => {
                let kind = match e {
                    SandboxError::Provision(_) => "provision",
                    SandboxError::InvalidInput(_) => "validation",
                    SandboxError::Timeout { .. } => "timeout",
                    SandboxError::Request(_) | SandboxError::Status { .. } => "upstream",
                };
                json!({ "error": message, "kind": kind })
            }
            ApiError::Preview(PreviewError::TooLarge { limit, .. }) => json!({
                "error": "too_large",
                "message": message,
                "limit": limit,
            }),
            ApiError::Preview(PreviewError::Unsupported { .. }) => json!({
                "error": "unsupported",
                "message": message,
                "supported": SUPPORTED_EXTENSIONS,
            }),
            ApiError::Preview(_) => json!({
                "error": "unparseable",
                "message": message,
            }),
        }
    }
}

/// Undecodable bodies get the same structured validation error as
/// requests that decode but break a limit
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
