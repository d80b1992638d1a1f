//! Resolver, dispatch, and orchestration errors.

use thiserror::Error;
use uuid::Uuid;

use bioflow_layers::LayerError;

/// Validation failures of a scenario configuration. All of these are
/// terminal and reported before anything is dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scenario configuration is empty")]
    Empty,

    #[error(
        "parameter '{parameter}' assigned more than once for feedstock {feedstock_id} and algorithm '{algorithm_id}'"
    )]
    DuplicateParameterAssignment {
        feedstock_id: Uuid,
        algorithm_id: String,
        parameter: String,
    },

    #[error(
        "required parameter '{parameter}' has no value for feedstock {feedstock_id} and algorithm '{algorithm_id}'"
    )]
    Incomplete {
        feedstock_id: Uuid,
        algorithm_id: String,
        parameter: String,
    },

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Worker dispatch surface errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Transient: the queue/transport could not accept the job right now.
    #[error("worker queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("unknown job handle: {0}")]
    UnknownJob(Uuid),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("scenario {0} already has a run in flight")]
    ScenarioAlreadyRunning(Uuid),

    #[error("scenario not found: {0}")]
    ScenarioNotFound(Uuid),

    #[error("catchment not found: {0}")]
    CatchmentNotFound(Uuid),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("aggregated value units disagree: expected '{expected}', found '{found}'")]
    UnitMismatch { expected: String, found: String },
}
