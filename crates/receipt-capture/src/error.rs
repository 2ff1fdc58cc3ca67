use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("chat transport error: {0}")]
    Chat(String),

    #[error("chat not found: {0}")]
    NotFound(String),

    #[error("transaction store error: {0}")]
    Store(String),
}
