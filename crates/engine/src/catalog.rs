//! Scenario/catchment catalog seam.
//!
//! The surrounding application owns these records; the engine only reads
//! them, flips run states, and enforces the no-edit-while-running rule at
//! this layer.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use bioflow_core::{Catchment, RunState};

use crate::error::OrchestratorError;
use crate::resolver::ScenarioConfig;

/// A scenario as the engine sees it.
#[derive(Debug, Clone)]
pub struct ScenarioRecord {
    pub id: Uuid,
    pub name: String,
    pub region_id: Uuid,
    pub catchment_id: Uuid,
    pub run_state: RunState,
    pub config: ScenarioConfig,
}

#[async_trait]
pub trait ScenarioCatalog: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ScenarioRecord>, OrchestratorError>;

    async fn set_run_state(&self, id: Uuid, state: RunState) -> Result<(), OrchestratorError>;

    /// Replace a scenario's configuration.
    ///
    /// Rejected while a run is in flight; on success the scenario returns to
    /// `Changed`.
    async fn update_configuration(
        &self,
        id: Uuid,
        config: ScenarioConfig,
    ) -> Result<(), OrchestratorError>;

    async fn catchment(&self, id: Uuid) -> Result<Option<Catchment>, OrchestratorError>;
}

/// In-memory catalog, used in tests and deployments where the surrounding
/// application keeps scenarios in process.
#[derive(Default)]
pub struct MemoryScenarioCatalog {
    scenarios: RwLock<HashMap<Uuid, ScenarioRecord>>,
    catchments: RwLock<HashMap<Uuid, Catchment>>,
}

impl MemoryScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_scenario(&self, scenario: ScenarioRecord) {
        self.scenarios.write().await.insert(scenario.id, scenario);
    }

    pub async fn insert_catchment(&self, catchment: Catchment) {
        self.catchments
            .write()
            .await
            .insert(catchment.id, catchment);
    }
}

#[async_trait]
impl ScenarioCatalog for MemoryScenarioCatalog {
    async fn get(&self, id: Uuid) -> Result<Option<ScenarioRecord>, OrchestratorError> {
        Ok(self.scenarios.read().await.get(&id).cloned())
    }

    async fn set_run_state(&self, id: Uuid, state: RunState) -> Result<(), OrchestratorError> {
        let mut scenarios = self.scenarios.write().await;
        let scenario = scenarios
            .get_mut(&id)
            .ok_or(OrchestratorError::ScenarioNotFound(id))?;
        tracing::debug!(scenario = %id, from = %scenario.run_state, to = %state, "run state transition");
        scenario.run_state = state;
        Ok(())
    }

    async fn update_configuration(
        &self,
        id: Uuid,
        config: ScenarioConfig,
    ) -> Result<(), OrchestratorError> {
        let mut scenarios = self.scenarios.write().await;
        let scenario = scenarios
            .get_mut(&id)
            .ok_or(OrchestratorError::ScenarioNotFound(id))?;
        if scenario.run_state == RunState::Running {
            return Err(OrchestratorError::ScenarioAlreadyRunning(id));
        }
        scenario.config = config;
        scenario.run_state = RunState::Changed;
        Ok(())
    }

    async fn catchment(&self, id: Uuid) -> Result<Option<Catchment>, OrchestratorError> {
        Ok(self.catchments.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{polygon, MultiPolygon};

    use super::*;

    fn scenario(run_state: RunState) -> ScenarioRecord {
        ScenarioRecord {
            id: Uuid::new_v4(),
            name: "test scenario".into(),
            region_id: Uuid::new_v4(),
            catchment_id: Uuid::new_v4(),
            run_state,
            config: ScenarioConfig::default(),
        }
    }

    #[tokio::test]
    async fn edit_while_running_is_rejected() {
        let catalog = MemoryScenarioCatalog::new();
        let record = scenario(RunState::Running);
        let id = record.id;
        catalog.insert_scenario(record).await;

        let err = catalog
            .update_configuration(id, ScenarioConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ScenarioAlreadyRunning(got) if got == id));

        // State unchanged by the rejected edit.
        let stored = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(stored.run_state, RunState::Running);
    }

    #[tokio::test]
    async fn edit_resets_terminal_state_to_changed() {
        let catalog = MemoryScenarioCatalog::new();
        let record = scenario(RunState::Finished);
        let id = record.id;
        catalog.insert_scenario(record).await;

        catalog
            .update_configuration(id, ScenarioConfig::default())
            .await
            .unwrap();
        let stored = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(stored.run_state, RunState::Changed);
    }

    #[tokio::test]
    async fn catchment_lookup() {
        let catalog = MemoryScenarioCatalog::new();
        let catchment = Catchment {
            id: Uuid::new_v4(),
            name: "test catchment".into(),
            geom: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
        };
        let id = catchment.id;
        catalog.insert_catchment(catchment).await;

        assert!(catalog.catchment(id).await.unwrap().is_some());
        assert!(catalog.catchment(Uuid::new_v4()).await.unwrap().is_none());
    }
}
