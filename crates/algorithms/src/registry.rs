//! Explicit algorithm registration table.
//!
//! Algorithms are registered once at process start and resolved by
//! identifier; there is no dynamic lookup by module path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use geo_types::MultiPolygon;
use uuid::Uuid;

use bioflow_core::RunResult;

use crate::area_yield::AvgAreaYield;
use crate::error::AlgorithmError;
use crate::params::{ParameterDef, ParameterMap};
use crate::point_yield::AvgPointYield;
use crate::source::FeatureSource;

/// Everything a single algorithm run gets to see.
pub struct AlgorithmContext {
    pub scenario_id: Uuid,
    pub feedstock_id: Uuid,
    /// Catchment geometry the run is scoped to (lon/lat).
    pub catchment: MultiPolygon<f64>,
    /// Input dataset handle, resolved from the algorithm's declared dataset.
    pub source: Arc<dyn FeatureSource>,
    /// Resolved parameter values for this unit of work.
    pub params: ParameterMap,
}

/// A pure computation turning spatial/statistical inputs into aggregated
/// values and feature rows.
#[async_trait]
pub trait InventoryAlgorithm: Send + Sync {
    /// Stable identifier used in configurations and result-table naming.
    fn id(&self) -> &str;

    /// Human-readable name for progress views.
    fn name(&self) -> &str;

    /// Dataset identifier this algorithm reads its input features from.
    fn dataset(&self) -> &str;

    /// Declared parameters, including whether each is required.
    fn parameters(&self) -> &[ParameterDef];

    async fn run(&self, ctx: &AlgorithmContext) -> Result<RunResult, AlgorithmError>;
}

/// Registration table mapping algorithm identifiers to implementations.
#[derive(Default)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, Arc<dyn InventoryAlgorithm>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in algorithm families.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AvgPointYield::new("trees")));
        registry.register(Arc::new(AvgAreaYield::new("green_areas", Vec::new())));
        registry
    }

    pub fn register(&mut self, algorithm: Arc<dyn InventoryAlgorithm>) {
        tracing::info!(algorithm = algorithm.id(), "registered inventory algorithm");
        self.algorithms
            .insert(algorithm.id().to_string(), algorithm);
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn InventoryAlgorithm>, AlgorithmError> {
        self.algorithms
            .get(id)
            .cloned()
            .ok_or_else(|| AlgorithmError::UnknownAlgorithm(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.algorithms.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn InventoryAlgorithm>> {
        self.algorithms.values()
    }
}
