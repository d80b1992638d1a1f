pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod resolver;

pub use catalog::{MemoryScenarioCatalog, ScenarioCatalog, ScenarioRecord};
pub use error::{ConfigError, DispatchError, OrchestratorError};
pub use orchestrator::{
    JobProgress, LayerData, LayerProduction, Orchestrator, ScenarioProgress, ScenarioSummary,
};
pub use pool::{JobStatus, TokioWorkerPool, WorkerPool};
pub use resolver::{ConfigEntry, ParameterAssignment, ScenarioConfig, UnitOfWork};
