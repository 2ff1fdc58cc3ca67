use thiserror::Error;

/// Per-crate error type for the parsing cascade. Maps onto
/// `receipt_core::CoreError`'s abstract taxonomy at the worker boundary.
#[derive(Debug, Error)]
pub enum ParsingError {
    #[error("invalid amount string: {0}")]
    InvalidAmount(String),

    #[error("invalid date/time: {0}")]
    InvalidDate(String),

    #[error("cascade exhausted without a record")]
    Exhausted,

    #[error("pdf extraction failed: {0}")]
    Pdf(String),

    #[error("model provider error: {0}")]
    Provider(String),

    #[error("model reply did not match the expected schema: {0}")]
    SchemaMismatch(String),

    #[error("vision model unavailable: {0}")]
    VisionUnavailable(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ParsingError {
    /// Permanent/transient classification per §4.5 & §7's error
    /// taxonomy: text markers "cannot parse", "empty", "unsupported",
    /// "missing", "invalid" are permanent; timeouts/transport are transient.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, ParsingError::Timeout(_) | ParsingError::Provider(_))
    }
}
