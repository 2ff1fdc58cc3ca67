use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("model provider error: {0}")]
    Provider(String),
}
