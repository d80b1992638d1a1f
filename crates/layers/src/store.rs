//! Layer store trait and the records it manages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use wkt::ToWkt;

use bioflow_core::{AggregatedValue, Feature, RunResult};

use crate::error::LayerError;
use crate::schema::{result_table_name, GeometryKind, LayerSchema};

/// Registry entry describing one provisioned result layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerMeta {
    /// Display name; defaults to the algorithm identifier.
    pub name: String,
    pub scenario_id: Uuid,
    pub algorithm_id: String,
    /// Deterministic physical table name.
    pub table_name: String,
    pub schema: LayerSchema,
    pub created_at: DateTime<Utc>,
}

/// One stored feature, geometry encoded as WKT.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRow {
    pub geom: String,
    pub columns: IndexMap<String, Value>,
}

/// Storage for result layers: per-layer physical tables plus metadata and
/// aggregated values.
///
/// Concurrent `create_or_replace` calls for the same (scenario, algorithm)
/// key are serialized by every implementation.
#[async_trait]
pub trait LayerStore: Send + Sync {
    /// Provision (or reuse) the layer for a (scenario, algorithm) pair and
    /// store the run result in it.
    ///
    /// - No layer yet: create metadata and the physical table, insert all
    ///   features and aggregated values.
    /// - Existing layer with an identical shape: truncate rows and
    ///   aggregated values, then re-insert; the table is reused.
    /// - Existing layer with a different shape: drop table and metadata,
    ///   then create from scratch.
    async fn create_or_replace(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
        result: &RunResult,
    ) -> Result<LayerMeta, LayerError>;

    /// Append one feature to an existing layer.
    async fn append(&self, layer: &LayerMeta, feature: &Feature) -> Result<(), LayerError>;

    /// All stored feature rows of a layer.
    async fn read(&self, layer: &LayerMeta) -> Result<Vec<FeatureRow>, LayerError>;

    /// Aggregated values recorded for a layer.
    async fn aggregated_values(
        &self,
        layer: &LayerMeta,
    ) -> Result<Vec<AggregatedValue>, LayerError>;

    /// Look up the layer for a (scenario, algorithm) pair.
    async fn get(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
    ) -> Result<Option<LayerMeta>, LayerError>;

    /// All layers owned by a scenario.
    async fn list(&self, scenario_id: Uuid) -> Result<Vec<LayerMeta>, LayerError>;

    /// Delete one layer: physical table first, then metadata. Deleting a
    /// layer that does not exist (or whose table is already gone) is not an
    /// error.
    async fn delete(&self, scenario_id: Uuid, algorithm_id: &str) -> Result<(), LayerError>;

    /// Delete every layer of a scenario, returning how many were removed.
    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError>;
}

/// Validate a run result and derive the layer metadata and rows to store.
///
/// Shared by all store implementations so they agree on schema inference,
/// geometry-kind validation, and table naming.
pub(crate) fn prepare_layer(
    scenario_id: Uuid,
    algorithm_id: &str,
    result: &RunResult,
) -> Result<(LayerMeta, Vec<FeatureRow>), LayerError> {
    let features = result
        .features
        .as_ref()
        .ok_or(LayerError::NoFeaturesProvided)?;

    let geometry_kind = GeometryKind::parse(&result.geometry_kind)?;
    let (schema, _dropped) = LayerSchema::infer(geometry_kind, features);

    let meta = LayerMeta {
        name: algorithm_id.to_string(),
        scenario_id,
        algorithm_id: algorithm_id.to_string(),
        table_name: result_table_name(scenario_id, algorithm_id),
        schema,
        created_at: Utc::now(),
    };

    let rows = features
        .iter()
        .map(|f| feature_row(f, &meta.schema))
        .collect();

    Ok((meta, rows))
}

/// Project a feature onto a layer's declared columns.
pub(crate) fn feature_row(feature: &Feature, schema: &LayerSchema) -> FeatureRow {
    let columns = schema
        .columns
        .iter()
        .map(|col| {
            let value = feature
                .properties
                .get(&col.name)
                .cloned()
                .unwrap_or(Value::Null);
            (col.name.clone(), value)
        })
        .collect();

    FeatureRow {
        geom: feature.geom.wkt_string(),
        columns,
    }
}
