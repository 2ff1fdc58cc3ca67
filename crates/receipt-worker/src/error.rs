use receipt_capture::CaptureError;
use receipt_chat::ChatError;
use receipt_parsing::ParsingError;
use receipt_resolver::ResolverError;
use receipt_store::StoreError;
use thiserror::Error;

/// Per-message pipeline failure. Carries the permanent/transient
/// classification §4.5's error policy requires: permanent failures
/// advance the monitor cursor so the same message is not retried forever,
/// transient ones leave it for the next catch-up pass.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("chat transport error: {0}")]
    Chat(#[from] ChatError),

    #[error("capture layer error: {0}")]
    Capture(#[from] CaptureError),

    #[error("parsing error: {0}")]
    Parsing(#[from] ParsingError),

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Permanent(String),

    #[error("{0}")]
    Transient(String),
}

impl WorkerError {
    /// Permanent failure markers per §4.5: "cannot parse", "empty",
    /// "unsupported", "missing", "invalid". Timeouts and transport errors
    /// are transient; everything else defaults to permanent since retrying
    /// an unclassified error indefinitely is worse than giving up once.
    pub fn is_permanent(&self) -> bool {
        match self {
            WorkerError::Permanent(_) => true,
            WorkerError::Transient(_) => false,
            WorkerError::Chat(e) => !matches!(
                e,
                ChatError::Timeout(_) | ChatError::TransportUnavailable(_) | ChatError::ShuttingDown
            ),
            WorkerError::Capture(_) => false,
            WorkerError::Parsing(e) => e.is_permanent(),
            WorkerError::Resolver(_) => false,
            WorkerError::Store(_) => false,
        }
    }
}
