//! Algorithm and parameter resolution errors.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("unknown parameter '{parameter}' for algorithm '{algorithm}'")]
    UnknownParameter { algorithm: String, parameter: String },

    #[error("unknown parameter value: {0}")]
    UnknownParameterValue(Uuid),

    #[error("unknown source dataset: {0}")]
    UnknownDataset(String),

    #[error("source error: {0}")]
    Source(String),

    #[error(transparent)]
    Clip(#[from] bioflow_gis::ClipError),
}
