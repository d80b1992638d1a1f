//! Worker dispatch surface and the in-process Tokio pool.
//!
//! The orchestrator is agnostic to the transport behind [`WorkerPool`];
//! [`TokioWorkerPool`] fans units out as spawned tasks with unbounded
//! concurrency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use bioflow_algorithms::{AlgorithmContext, AlgorithmRegistry, SourceRegistry};
use bioflow_layers::LayerStore;

use crate::catalog::ScenarioCatalog;
use crate::error::DispatchError;
use crate::resolver::UnitOfWork;

/// Live status of one dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Dispatch surface for units of work.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Dispatch a unit; returns the external job handle.
    async fn submit(&self, unit: UnitOfWork) -> Result<Uuid, DispatchError>;

    /// Live status of a job.
    async fn status(&self, job: Uuid) -> Result<JobStatus, DispatchError>;

    /// The failure message of a job, if it failed.
    async fn error(&self, job: Uuid) -> Result<Option<String>, DispatchError>;

    /// Resolve once the job reaches a terminal status. This is the pool's
    /// own completion signal; callers bound it with their own timeout.
    async fn wait(&self, job: Uuid) -> Result<JobStatus, DispatchError>;

    /// Best-effort cancellation of a still-pending or running job.
    async fn cancel(&self, job: Uuid) -> Result<(), DispatchError>;
}

struct JobEntry {
    scenario_id: Uuid,
    algorithm_id: String,
    tx: Arc<watch::Sender<JobStatus>>,
    rx: watch::Receiver<JobStatus>,
    error: Arc<StdMutex<Option<String>>>,
    handle: JoinHandle<()>,
}

/// Worker pool executing units as spawned Tokio tasks.
pub struct TokioWorkerPool {
    registry: Arc<AlgorithmRegistry>,
    sources: Arc<SourceRegistry>,
    catalog: Arc<dyn ScenarioCatalog>,
    layers: Arc<dyn LayerStore>,
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl TokioWorkerPool {
    pub fn new(
        registry: Arc<AlgorithmRegistry>,
        sources: Arc<SourceRegistry>,
        catalog: Arc<dyn ScenarioCatalog>,
        layers: Arc<dyn LayerStore>,
    ) -> Self {
        Self {
            registry,
            sources,
            catalog,
            layers,
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WorkerPool for TokioWorkerPool {
    async fn submit(&self, unit: UnitOfWork) -> Result<Uuid, DispatchError> {
        let job_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(JobStatus::Pending);
        let tx = Arc::new(tx);
        let error = Arc::new(StdMutex::new(None));

        let task_tx = tx.clone();
        let task_error = error.clone();
        let registry = self.registry.clone();
        let sources = self.sources.clone();
        let catalog = self.catalog.clone();
        let layers = self.layers.clone();
        let scenario_id = unit.scenario_id;
        let algorithm_id = unit.algorithm_id.clone();

        debug!(job = %job_id, algorithm = %algorithm_id, "dispatching unit of work");

        let handle = tokio::spawn(async move {
            task_tx.send(JobStatus::Running).ok();
            match execute_unit(&unit, &registry, &sources, &*catalog, &*layers).await {
                Ok(()) => {
                    task_tx.send(JobStatus::Succeeded).ok();
                }
                Err(message) => {
                    warn!(job = %job_id, algorithm = %unit.algorithm_id, error = %message, "unit of work failed");
                    *task_error.lock().unwrap() = Some(message);
                    task_tx.send(JobStatus::Failed).ok();
                }
            }
        });

        self.jobs.write().await.insert(
            job_id,
            JobEntry {
                scenario_id,
                algorithm_id,
                tx,
                rx,
                error,
                handle,
            },
        );
        Ok(job_id)
    }

    async fn status(&self, job: Uuid) -> Result<JobStatus, DispatchError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job).ok_or(DispatchError::UnknownJob(job))?;
        let status = *entry.rx.borrow();
        Ok(status)
    }

    async fn error(&self, job: Uuid) -> Result<Option<String>, DispatchError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job).ok_or(DispatchError::UnknownJob(job))?;
        let err = entry.error.lock().unwrap().clone();
        Ok(err)
    }

    async fn wait(&self, job: Uuid) -> Result<JobStatus, DispatchError> {
        let mut rx = {
            let jobs = self.jobs.read().await;
            jobs.get(&job)
                .ok_or(DispatchError::UnknownJob(job))?
                .rx
                .clone()
        };

        loop {
            let current = *rx.borrow();
            if current.is_terminal() {
                return Ok(current);
            }
            if rx.changed().await.is_err() {
                // Sender gone without a terminal status; treat as failed.
                let last = *rx.borrow();
                return Ok(if last.is_terminal() { last } else { JobStatus::Failed });
            }
        }
    }

    async fn cancel(&self, job: Uuid) -> Result<(), DispatchError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job).ok_or(DispatchError::UnknownJob(job))?;
        if entry.rx.borrow().is_terminal() {
            return Ok(());
        }

        debug!(job = %job, scenario = %entry.scenario_id, algorithm = %entry.algorithm_id, "cancelling job");
        entry.handle.abort();
        *entry.error.lock().unwrap() = Some("cancelled".to_string());
        entry.tx.send(JobStatus::Failed).ok();
        Ok(())
    }
}

/// Run one unit end to end: resolve the algorithm, execute it, persist the
/// result layer. Failures are reported as messages attributed to this unit.
async fn execute_unit(
    unit: &UnitOfWork,
    registry: &AlgorithmRegistry,
    sources: &SourceRegistry,
    catalog: &dyn ScenarioCatalog,
    layers: &dyn LayerStore,
) -> Result<(), String> {
    let algorithm = registry
        .resolve(&unit.algorithm_id)
        .map_err(|e| e.to_string())?;

    let catchment = catalog
        .catchment(unit.catchment_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("catchment not found: {}", unit.catchment_id))?;

    let source = sources
        .resolve(algorithm.dataset())
        .map_err(|e| e.to_string())?;

    let ctx = AlgorithmContext {
        scenario_id: unit.scenario_id,
        feedstock_id: unit.feedstock_id,
        catchment: catchment.geom,
        source,
        params: unit.params.clone(),
    };

    let result = algorithm.run(&ctx).await.map_err(|e| e.to_string())?;
    layers
        .create_or_replace(unit.scenario_id, &unit.algorithm_id, &result)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bioflow_algorithms::ParameterMap;
    use bioflow_layers::MemoryLayerStore;

    use crate::catalog::MemoryScenarioCatalog;

    use super::*;

    fn pool() -> TokioWorkerPool {
        TokioWorkerPool::new(
            Arc::new(AlgorithmRegistry::builtin()),
            Arc::new(SourceRegistry::new()),
            Arc::new(MemoryScenarioCatalog::new()),
            Arc::new(MemoryLayerStore::new()),
        )
    }

    fn unit(algorithm_id: &str) -> UnitOfWork {
        UnitOfWork {
            scenario_id: Uuid::new_v4(),
            catchment_id: Uuid::new_v4(),
            feedstock_id: Uuid::new_v4(),
            algorithm_id: algorithm_id.to_string(),
            params: ParameterMap::new(),
        }
    }

    #[tokio::test]
    async fn unknown_job_handle() {
        let pool = pool();
        let job = Uuid::new_v4();
        assert!(matches!(
            pool.status(job).await,
            Err(DispatchError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn failing_unit_reports_error() {
        let pool = pool();
        // No catchment registered: the unit fails after dispatch.
        let job = pool.submit(unit("avg_point_yield")).await.unwrap();

        let status = pool.wait(job).await.unwrap();
        assert_eq!(status, JobStatus::Failed);
        let message = pool.error(job).await.unwrap().unwrap();
        assert!(message.contains("catchment not found"));
    }

    #[tokio::test]
    async fn unknown_algorithm_fails_the_unit() {
        let pool = pool();
        let job = pool.submit(unit("not_registered")).await.unwrap();

        assert_eq!(pool.wait(job).await.unwrap(), JobStatus::Failed);
        let message = pool.error(job).await.unwrap().unwrap();
        assert!(message.contains("unknown algorithm"));
    }

    #[tokio::test]
    async fn cancel_marks_job_failed() {
        let pool = pool();
        let job = pool.submit(unit("avg_point_yield")).await.unwrap();

        pool.cancel(job).await.unwrap();
        assert_eq!(pool.wait(job).await.unwrap(), JobStatus::Failed);
    }
}
