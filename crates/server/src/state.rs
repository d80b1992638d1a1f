//! Shared application state for the HTTP surface.

use std::sync::Arc;

use bioflow_engine::{MemoryScenarioCatalog, Orchestrator};

pub struct AppState {
    /// Scenario/catchment registrations. The engine sees this through the
    /// `ScenarioCatalog` seam; the HTTP surface also registers records here.
    pub catalog: Arc<MemoryScenarioCatalog>,
    pub orchestrator: Arc<Orchestrator>,
}
