use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use receipt_capture::CaptureError;
use receipt_chat::ChatError;
use receipt_resolver::ResolverError;
use receipt_store::StoreError;
use receipt_worker::WorkerError;

/// HTTP-boundary error type. Every handler returns this so one
/// `IntoResponse` impl maps every crate's concrete error enum onto a
/// status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Chat(ChatError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Chat(ChatError::AuthStepInvalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Chat(ChatError::TransportUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Chat(ChatError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Chat(_) => StatusCode::BAD_GATEWAY,
            ApiError::Capture(CaptureError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Worker(e) if e.is_permanent() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Worker(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, %status, "request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
