//! Run-state machine, fan-out dispatch, and fan-in completion watching.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use bioflow_algorithms::AlgorithmRegistry;
use bioflow_core::config::EngineConfig;
use bioflow_core::{AggregatedValue, RunState};
use bioflow_layers::{FeatureRow, JobRecordStore, LayerMeta, LayerStore, RunningJob};

use crate::catalog::ScenarioCatalog;
use crate::error::{DispatchError, OrchestratorError};
use crate::pool::{JobStatus, WorkerPool};
use crate::resolver::UnitOfWork;

/// Client-facing progress view of a scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioProgress {
    pub scenario_id: Uuid,
    pub state: RunState,
    pub jobs: Vec<JobProgress>,
}

#[derive(Debug, Serialize)]
pub struct JobProgress {
    pub algorithm_name: String,
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One stored layer with its aggregates and features, for rendering/export.
#[derive(Debug, Serialize)]
pub struct LayerData {
    pub layer: LayerMeta,
    pub aggregated_values: Vec<AggregatedValue>,
    pub features: Vec<FeatureRow>,
}

/// Cross-layer production summary of a finished scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    pub scenario_id: Uuid,
    pub total_production: f64,
    pub unit: Option<String>,
    pub layers: Vec<LayerProduction>,
}

#[derive(Debug, Serialize)]
pub struct LayerProduction {
    pub algorithm_id: String,
    pub feedstock_id: Option<Uuid>,
    pub production: f64,
    pub unit: String,
}

/// Drives scenarios through `Changed -> Running -> {Finished, Failed}`.
pub struct Orchestrator {
    catalog: Arc<dyn ScenarioCatalog>,
    registry: Arc<AlgorithmRegistry>,
    pool: Arc<dyn WorkerPool>,
    layers: Arc<dyn LayerStore>,
    jobs: Arc<dyn JobRecordStore>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn ScenarioCatalog>,
        registry: Arc<AlgorithmRegistry>,
        pool: Arc<dyn WorkerPool>,
        layers: Arc<dyn LayerStore>,
        jobs: Arc<dyn JobRecordStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            pool,
            layers,
            jobs,
            config,
        }
    }

    /// Start a scenario run: expand the configuration, dispatch every unit,
    /// and register the fan-in watcher. Returns the dispatched job handles;
    /// result computation continues asynchronously.
    pub async fn start_run(&self, scenario_id: Uuid) -> Result<Vec<Uuid>, OrchestratorError> {
        let scenario = self
            .catalog
            .get(scenario_id)
            .await?
            .ok_or(OrchestratorError::ScenarioNotFound(scenario_id))?;

        if scenario.run_state == RunState::Running {
            return Err(OrchestratorError::ScenarioAlreadyRunning(scenario_id));
        }

        self.catalog
            .set_run_state(scenario_id, RunState::Running)
            .await?;

        // A fresh run fully supersedes prior output.
        let removed = self.layers.delete_scenario(scenario_id).await?;
        if removed > 0 {
            info!(scenario = %scenario_id, removed, "deleted result layers of previous run");
        }

        if self.catalog.catchment(scenario.catchment_id).await?.is_none() {
            warn!(scenario = %scenario_id, catchment = %scenario.catchment_id, "catchment missing, nothing dispatched");
            self.catalog
                .set_run_state(scenario_id, RunState::Failed)
                .await?;
            return Err(OrchestratorError::CatchmentNotFound(scenario.catchment_id));
        }

        let units = match scenario
            .config
            .expand(scenario_id, scenario.catchment_id, &self.registry)
        {
            Ok(units) => units,
            Err(e) => {
                warn!(scenario = %scenario_id, error = %e, "configuration invalid, nothing dispatched");
                self.catalog
                    .set_run_state(scenario_id, RunState::Failed)
                    .await?;
                return Err(e.into());
            }
        };

        let total = units.len();
        let mut handles = Vec::with_capacity(total);
        let mut dispatch_failures = 0usize;
        for unit in units {
            let algorithm_id = unit.algorithm_id.clone();
            match self.submit_with_retry(unit).await {
                Ok(job_id) => {
                    self.jobs
                        .insert(&RunningJob {
                            job_id,
                            scenario_id,
                            algorithm_id,
                            dispatched_at: Utc::now(),
                        })
                        .await?;
                    handles.push(job_id);
                }
                Err(e) => {
                    warn!(scenario = %scenario_id, algorithm = %algorithm_id, error = %e, "dispatch failed, unit counted as failed");
                    dispatch_failures += 1;
                }
            }
        }

        info!(scenario = %scenario_id, dispatched = handles.len(), total, "run started");
        self.spawn_watcher(scenario_id, handles.clone(), dispatch_failures);
        Ok(handles)
    }

    /// Cancel a run: best-effort cancel of pending units, transition to
    /// `Failed`, and clean up job records so nothing polls forever.
    pub async fn cancel_run(&self, scenario_id: Uuid) -> Result<(), OrchestratorError> {
        let records = self.jobs.for_scenario(scenario_id).await?;
        for record in &records {
            if let Err(e) = self.pool.cancel(record.job_id).await {
                warn!(job = %record.job_id, error = %e, "cancel failed");
            }
        }
        self.catalog
            .set_run_state(scenario_id, RunState::Failed)
            .await?;
        self.jobs.delete_scenario(scenario_id).await?;
        info!(scenario = %scenario_id, cancelled = records.len(), "run cancelled");
        Ok(())
    }

    /// Progress view built from job records plus each handle's live status.
    ///
    /// When the pool no longer knows a handle (e.g. after a restart), the
    /// persisted record still shows the job as pending rather than dropping
    /// it from the view.
    pub async fn progress(&self, scenario_id: Uuid) -> Result<ScenarioProgress, OrchestratorError> {
        let scenario = self
            .catalog
            .get(scenario_id)
            .await?
            .ok_or(OrchestratorError::ScenarioNotFound(scenario_id))?;

        let records = self.jobs.for_scenario(scenario_id).await?;
        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let status = match self.pool.status(record.job_id).await {
                Ok(status) => status,
                Err(DispatchError::UnknownJob(_)) => JobStatus::Pending,
                Err(e) => return Err(e.into()),
            };
            let error = self.pool.error(record.job_id).await.unwrap_or(None);
            let algorithm_name = self
                .registry
                .resolve(&record.algorithm_id)
                .map(|a| a.name().to_string())
                .unwrap_or_else(|_| record.algorithm_id.clone());
            jobs.push(JobProgress {
                algorithm_name,
                job_id: record.job_id,
                status,
                error,
            });
        }

        Ok(ScenarioProgress {
            scenario_id,
            state: scenario.run_state,
            jobs,
        })
    }

    /// Stored result layer of a (scenario, algorithm) pair, with aggregates
    /// and features.
    pub async fn layer(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
    ) -> Result<Option<LayerData>, OrchestratorError> {
        let Some(layer) = self.layers.get(scenario_id, algorithm_id).await? else {
            return Ok(None);
        };
        let aggregated_values = self.layers.aggregated_values(&layer).await?;
        let features = self.layers.read(&layer).await?;
        Ok(Some(LayerData {
            layer,
            aggregated_values,
            features,
        }))
    }

    /// Sum "Total production" across all of a scenario's layers.
    ///
    /// Layers without that aggregate are skipped; layers disagreeing on the
    /// unit fail the summary.
    pub async fn result_summary(
        &self,
        scenario_id: Uuid,
    ) -> Result<ScenarioSummary, OrchestratorError> {
        let scenario = self
            .catalog
            .get(scenario_id)
            .await?
            .ok_or(OrchestratorError::ScenarioNotFound(scenario_id))?;

        let mut total = 0.0;
        let mut unit: Option<String> = None;
        let mut productions = Vec::new();

        for layer in self.layers.list(scenario_id).await? {
            let aggregates = self.layers.aggregated_values(&layer).await?;
            let Some(production) = aggregates.iter().find(|a| a.name == "Total production")
            else {
                continue;
            };

            match &unit {
                None => unit = Some(production.unit.clone()),
                Some(expected) if *expected != production.unit => {
                    return Err(OrchestratorError::UnitMismatch {
                        expected: expected.clone(),
                        found: production.unit.clone(),
                    });
                }
                Some(_) => {}
            }

            total += production.value;
            let feedstock_id = scenario
                .config
                .entries
                .iter()
                .find(|e| e.algorithm_id == layer.algorithm_id)
                .map(|e| e.feedstock_id);
            productions.push(LayerProduction {
                algorithm_id: layer.algorithm_id.clone(),
                feedstock_id,
                production: production.value,
                unit: production.unit.clone(),
            });
        }

        Ok(ScenarioSummary {
            scenario_id,
            total_production: total,
            unit,
            layers: productions,
        })
    }

    /// Dispatch with bounded retries on transient queue errors.
    async fn submit_with_retry(&self, unit: UnitOfWork) -> Result<Uuid, DispatchError> {
        let mut backoff = Duration::from_millis(self.config.dispatch_backoff_ms);
        let mut attempt = 0u32;
        loop {
            match self.pool.submit(unit.clone()).await {
                Ok(job_id) => return Ok(job_id),
                Err(e @ DispatchError::QueueUnavailable(_))
                    if attempt + 1 < self.config.dispatch_retries =>
                {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient dispatch error, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fan-in: wait for every dispatched unit to report terminal status
    /// (bounded per unit by the configured ceiling), then finalize the run.
    fn spawn_watcher(&self, scenario_id: Uuid, jobs: Vec<Uuid>, pre_failed: usize) {
        let pool = self.pool.clone();
        let catalog = self.catalog.clone();
        let records = self.jobs.clone();
        let ceiling = Duration::from_secs(self.config.unit_timeout_secs);

        tokio::spawn(async move {
            let total = jobs.len() + pre_failed;
            let waits = jobs.into_iter().map(|job| {
                let pool = pool.clone();
                async move {
                    match tokio::time::timeout(ceiling, pool.wait(job)).await {
                        Ok(Ok(status)) => status,
                        Ok(Err(e)) => {
                            warn!(job = %job, error = %e, "lost job handle, counted as failed");
                            JobStatus::Failed
                        }
                        Err(_) => {
                            warn!(job = %job, "no terminal signal within ceiling, counted as failed");
                            pool.cancel(job).await.ok();
                            JobStatus::Failed
                        }
                    }
                }
            });

            let statuses = futures::future::join_all(waits).await;
            let failed =
                pre_failed + statuses.iter().filter(|s| **s != JobStatus::Succeeded).count();

            let final_state = if failed == 0 {
                RunState::Finished
            } else {
                RunState::Failed
            };

            if let Err(e) = catalog.set_run_state(scenario_id, final_state).await {
                warn!(scenario = %scenario_id, error = %e, "failed to finalize run state");
            }
            if let Err(e) = records.delete_scenario(scenario_id).await {
                warn!(scenario = %scenario_id, error = %e, "failed to delete job records");
            }
            info!(scenario = %scenario_id, state = %final_state, failed, total, "run complete");
        });
    }
}
