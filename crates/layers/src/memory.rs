//! In-memory layer store, used in tests and deployments without PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use bioflow_core::{AggregatedValue, Feature, RunResult};

use crate::error::LayerError;
use crate::store::{feature_row, prepare_layer, FeatureRow, LayerMeta, LayerStore};

struct TableEntry {
    meta: LayerMeta,
    rows: Vec<FeatureRow>,
    aggregates: Vec<AggregatedValue>,
}

/// Layer store backed by a process-local map.
///
/// One lock over the whole map serializes concurrent `create_or_replace`
/// calls, which subsumes the required per-key serialization.
#[derive(Default)]
pub struct MemoryLayerStore {
    tables: Mutex<HashMap<String, TableEntry>>,
}

impl MemoryLayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LayerStore for MemoryLayerStore {
    async fn create_or_replace(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
        result: &RunResult,
    ) -> Result<LayerMeta, LayerError> {
        let (meta, rows) = prepare_layer(scenario_id, algorithm_id, result)?;
        let mut tables = self.tables.lock().await;

        let same_shape = tables
            .get(&meta.table_name)
            .map(|e| e.meta.schema.same_shape(&meta.schema));
        match same_shape {
            Some(true) => {
                info!(table = %meta.table_name, "reusing result table, truncating rows");
                let existing = tables.get_mut(&meta.table_name).expect("entry just seen");
                existing.rows = rows;
                existing.aggregates = result.aggregated_values.clone();
                Ok(existing.meta.clone())
            }
            shape => {
                if shape.is_some() {
                    info!(table = %meta.table_name, "result shape changed, replacing table");
                }
                tables.insert(
                    meta.table_name.clone(),
                    TableEntry {
                        meta: meta.clone(),
                        rows,
                        aggregates: result.aggregated_values.clone(),
                    },
                );
                Ok(meta)
            }
        }
    }

    async fn append(&self, layer: &LayerMeta, feature: &Feature) -> Result<(), LayerError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .get_mut(&layer.table_name)
            .ok_or_else(|| LayerError::Storage(format!("no such table: {}", layer.table_name)))?;
        entry.rows.push(feature_row(feature, &entry.meta.schema));
        Ok(())
    }

    async fn read(&self, layer: &LayerMeta) -> Result<Vec<FeatureRow>, LayerError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&layer.table_name)
            .map(|entry| entry.rows.clone())
            .unwrap_or_default())
    }

    async fn aggregated_values(
        &self,
        layer: &LayerMeta,
    ) -> Result<Vec<AggregatedValue>, LayerError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&layer.table_name)
            .map(|entry| entry.aggregates.clone())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
    ) -> Result<Option<LayerMeta>, LayerError> {
        let table_name = crate::schema::result_table_name(scenario_id, algorithm_id);
        let tables = self.tables.lock().await;
        Ok(tables.get(&table_name).map(|entry| entry.meta.clone()))
    }

    async fn list(&self, scenario_id: Uuid) -> Result<Vec<LayerMeta>, LayerError> {
        let tables = self.tables.lock().await;
        let mut layers: Vec<LayerMeta> = tables
            .values()
            .filter(|entry| entry.meta.scenario_id == scenario_id)
            .map(|entry| entry.meta.clone())
            .collect();
        layers.sort_by(|a, b| a.algorithm_id.cmp(&b.algorithm_id));
        Ok(layers)
    }

    async fn delete(&self, scenario_id: Uuid, algorithm_id: &str) -> Result<(), LayerError> {
        let table_name = crate::schema::result_table_name(scenario_id, algorithm_id);
        let mut tables = self.tables.lock().await;
        if tables.remove(&table_name).is_some() {
            info!(table = %table_name, "deleted result layer");
        }
        Ok(())
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError> {
        let mut tables = self.tables.lock().await;
        let before = tables.len();
        tables.retain(|_, entry| entry.meta.scenario_id != scenario_id);
        Ok(before - tables.len())
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{point, polygon};
    use serde_json::json;

    use super::*;

    fn point_result(count: usize) -> RunResult {
        let mut result = RunResult::new("point");
        result
            .aggregated_values
            .push(AggregatedValue::new("Count", count as f64, ""));
        result.features = Some(
            (0..count)
                .map(|i| {
                    Feature::new(point!(x: i as f64, y: 0.0))
                        .with_property("avg", json!(5.0))
                })
                .collect(),
        );
        result
    }

    fn polygon_result() -> RunResult {
        let mut result = RunResult::new("multipolygon");
        result.features = Some(vec![Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ])
        .with_property("area", json!(1.0))]);
        result
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        let meta = store
            .create_or_replace(scenario, "avg_point_yield", &point_result(3))
            .await
            .unwrap();

        assert_eq!(store.read(&meta).await.unwrap().len(), 3);
        assert_eq!(store.aggregated_values(&meta).await.unwrap().len(), 1);
        assert!(store.get(scenario, "avg_point_yield").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn identical_shape_truncates_and_reinserts() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        let first = store
            .create_or_replace(scenario, "avg_point_yield", &point_result(3))
            .await
            .unwrap();
        let second = store
            .create_or_replace(scenario, "avg_point_yield", &point_result(3))
            .await
            .unwrap();

        assert_eq!(first.table_name, second.table_name);
        // Truncate-and-reinsert, not append.
        assert_eq!(store.read(&second).await.unwrap().len(), 3);
        assert_eq!(store.aggregated_values(&second).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shape_change_replaces_table() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        store
            .create_or_replace(scenario, "avg_point_yield", &point_result(2))
            .await
            .unwrap();
        let replaced = store
            .create_or_replace(scenario, "avg_point_yield", &polygon_result())
            .await
            .unwrap();

        // Only the new shape survives.
        let columns: Vec<_> = replaced
            .schema
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(columns, vec!["area"]);
        assert_eq!(store.read(&replaced).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_after_create() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        let meta = store
            .create_or_replace(scenario, "avg_point_yield", &point_result(1))
            .await
            .unwrap();
        store
            .append(
                &meta,
                &Feature::new(point!(x: 9.0, y: 9.0)).with_property("avg", json!(4.0)),
            )
            .await
            .unwrap();

        assert_eq!(store.read(&meta).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        store
            .create_or_replace(scenario, "avg_point_yield", &point_result(1))
            .await
            .unwrap();

        store.delete(scenario, "avg_point_yield").await.unwrap();
        // Second delete of an already-removed layer is fine.
        store.delete(scenario, "avg_point_yield").await.unwrap();
        assert!(store.get(scenario, "avg_point_yield").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_scenario_removes_all_layers() {
        let store = MemoryLayerStore::new();
        let scenario = Uuid::new_v4();

        store
            .create_or_replace(scenario, "avg_point_yield", &point_result(1))
            .await
            .unwrap();
        store
            .create_or_replace(scenario, "avg_area_yield", &polygon_result())
            .await
            .unwrap();
        store
            .create_or_replace(Uuid::new_v4(), "avg_point_yield", &point_result(1))
            .await
            .unwrap();

        assert_eq!(store.delete_scenario(scenario).await.unwrap(), 2);
        assert!(store.list(scenario).await.unwrap().is_empty());
    }
}
