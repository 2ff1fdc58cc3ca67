use thiserror::Error;

/// Per-crate error type for the chat-session manager. Maps onto
/// `receipt_core::CoreError`'s abstract taxonomy at callers' boundaries.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("auth step invalid: {0}")]
    AuthStepInvalid(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("chat or message not found")]
    NotFound,

    #[error("grammers invocation failed: {0}")]
    Invocation(String),

    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutting down")]
    ShuttingDown,
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            ChatError::AuthStepInvalid(_) => "AUTH_STEP_INVALID",
            ChatError::Timeout(_) => "REQUEST_TIMEOUT",
            ChatError::NotFound => "NOT_FOUND",
            ChatError::Invocation(_) => "TRANSPORT_UNAVAILABLE",
            ChatError::Io(_) => "TRANSPORT_UNAVAILABLE",
            ChatError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}
