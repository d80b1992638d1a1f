//! PostgreSQL-backed feature sources.
//!
//! Each dataset maps to one table with the convention
//! `(geom TEXT /* WKT */, properties JSONB)`. The mapping is read from the
//! `DATASET_TABLES` env var as `dataset=table,dataset=table`.

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::{PgPool, Row};
use tracing::warn;
use wkt::TryFromWkt;

use bioflow_algorithms::{AlgorithmError, FeatureSource, SourceRegistry};
use bioflow_core::Feature;

pub struct PgFeatureSource {
    dataset: String,
    table: String,
    pool: PgPool,
}

impl PgFeatureSource {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>, pool: PgPool) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            pool,
        }
    }
}

#[async_trait]
impl FeatureSource for PgFeatureSource {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn features(&self) -> Result<Vec<Feature>, AlgorithmError> {
        let sql = format!(
            "SELECT geom, properties FROM \"{}\"",
            self.table.replace('"', "\"\"")
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AlgorithmError::Source(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let geom: String = row
                    .try_get("geom")
                    .map_err(|e| AlgorithmError::Source(e.to_string()))?;
                let geom: geo_types::Geometry<f64> = geo_types::Geometry::try_from_wkt_str(&geom)
                    .map_err(|e| AlgorithmError::Source(format!("invalid WKT: {e}")))?;

                let properties: Option<serde_json::Value> = row
                    .try_get("properties")
                    .map_err(|e| AlgorithmError::Source(e.to_string()))?;
                let properties: IndexMap<String, serde_json::Value> = match properties {
                    Some(serde_json::Value::Object(map)) => map.into_iter().collect(),
                    _ => IndexMap::new(),
                };

                Ok(Feature { geom, properties })
            })
            .collect()
    }
}

/// Parse `DATASET_TABLES` ("trees=gis_trees,green_areas=gis_parks") into
/// (dataset, table) pairs. Malformed entries are skipped with a warning.
pub fn dataset_tables_from_env() -> Vec<(String, String)> {
    let Ok(raw) = std::env::var("DATASET_TABLES") else {
        return Vec::new();
    };

    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            match entry.split_once('=') {
                Some((dataset, table)) if !dataset.trim().is_empty() && !table.trim().is_empty() => {
                    Some((dataset.trim().to_string(), table.trim().to_string()))
                }
                _ => {
                    warn!(entry, "ignoring malformed DATASET_TABLES entry");
                    None
                }
            }
        })
        .collect()
}

/// Build the source registry from the configured dataset tables.
pub fn build_sources(pool: Option<&PgPool>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    let mappings = dataset_tables_from_env();

    match pool {
        Some(pool) => {
            for (dataset, table) in mappings {
                registry.register(std::sync::Arc::new(PgFeatureSource::new(
                    dataset,
                    table,
                    pool.clone(),
                )));
            }
        }
        None if !mappings.is_empty() => {
            warn!("DATASET_TABLES set but PostgreSQL is not available — no sources registered");
        }
        None => {}
    }

    if registry.datasets().is_empty() {
        warn!("no feature sources registered — algorithm runs will fail until datasets are configured");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_tables_parsing() {
        // Serialize env mutation within this test.
        std::env::set_var("DATASET_TABLES", "trees=gis_trees, green_areas=gis_parks,,bad");
        let pairs = dataset_tables_from_env();
        std::env::remove_var("DATASET_TABLES");

        assert_eq!(
            pairs,
            vec![
                ("trees".to_string(), "gis_trees".to_string()),
                ("green_areas".to_string(), "gis_parks".to_string()),
            ]
        );
    }
}
