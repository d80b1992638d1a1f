//! Result-layer storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("unsupported geometry kind: {0}")]
    InvalidGeometryKind(String),

    #[error("run result carries no feature list")]
    NoFeaturesProvided,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}
