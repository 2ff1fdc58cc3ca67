use thiserror::Error;

/// Abstract error taxonomy shared across the pipeline crates. Concrete
/// per-crate error enums convert into this one at component boundaries so
/// the worker and the HTTP surface can classify failures uniformly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("chat transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("auth step invalid: {0}")]
    AuthStepInvalid(String),

    #[error("request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("vision model unavailable: {0}")]
    VisionUnavailable(String),

    #[error("uniqueness violation resolved by re-probe: {0}")]
    UniquenessViolation(String),

    #[error("transient storage error: {0}")]
    TransientStorage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine-readable code, mirroring `SkynetError::code()`.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            CoreError::AuthStepInvalid(_) => "AUTH_STEP_INVALID",
            CoreError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::ParseFailure(_) => "PARSE_FAILURE",
            CoreError::VisionUnavailable(_) => "VISION_UNAVAILABLE",
            CoreError::UniquenessViolation(_) => "UNIQUENESS_VIOLATION",
            CoreError::TransientStorage(_) => "TRANSIENT_STORAGE",
            CoreError::Database(_) => "DATABASE_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this failure should be retried by the catch-up loop rather
    /// than permanently advancing the monitor cursor. Permanent failure
    /// text markers: "cannot parse", "empty", "unsupported",
    /// "missing", "invalid".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::RequestTimeout(_) | CoreError::TransientStorage(_)
        )
    }
}
