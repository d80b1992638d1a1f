//! Running-job records used for progress polling and restart recovery.
//!
//! These records are not the source of truth for job completion; the worker
//! pool's own terminal signals are. They exist so a client (or a restarted
//! orchestrator) can still see what was dispatched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::LayerError;

/// One dispatched unit of work, keyed by the external job handle.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunningJob {
    pub job_id: Uuid,
    pub scenario_id: Uuid,
    pub algorithm_id: String,
    pub dispatched_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobRecordStore: Send + Sync {
    async fn insert(&self, job: &RunningJob) -> Result<(), LayerError>;

    async fn for_scenario(&self, scenario_id: Uuid) -> Result<Vec<RunningJob>, LayerError>;

    /// Delete every record of a scenario's batch; idempotent.
    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError>;
}

/// In-memory job records, used in tests and single-process deployments.
#[derive(Default)]
pub struct MemoryJobRecordStore {
    jobs: Mutex<Vec<RunningJob>>,
}

impl MemoryJobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRecordStore for MemoryJobRecordStore {
    async fn insert(&self, job: &RunningJob) -> Result<(), LayerError> {
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }

    async fn for_scenario(&self, scenario_id: Uuid) -> Result<Vec<RunningJob>, LayerError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.scenario_id == scenario_id)
            .cloned()
            .collect())
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.scenario_id != scenario_id);
        Ok(before - jobs.len())
    }
}
