//! PostgreSQL-backed layer store.
//!
//! Layer metadata lives in `result_layers` (+ `layer_aggregated_values`);
//! each layer owns one physical feature table created on demand. Concurrent
//! writers for the same key are serialized with a transaction-scoped
//! advisory lock on the table-name digest.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use bioflow_core::{AggregatedValue, Feature, RunResult};

use crate::error::LayerError;
use crate::jobs::{JobRecordStore, RunningJob};
use crate::schema::{result_table_name, ColumnDef, ColumnType, GeometryKind, LayerSchema};
use crate::store::{feature_row, prepare_layer, FeatureRow, LayerMeta, LayerStore};

pub struct PgLayerStore {
    pool: PgPool,
}

impl PgLayerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_key(
        tx: &mut Transaction<'_, Postgres>,
        table_name: &str,
    ) -> Result<(), LayerError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(table_name))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn physical_table_exists(
        tx: &mut Transaction<'_, Postgres>,
        table_name: &str,
    ) -> Result<bool, LayerError> {
        let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(table_name)
            .fetch_one(&mut **tx)
            .await?;
        Ok(found.is_some())
    }

    async fn fetch_meta(
        tx: &mut Transaction<'_, Postgres>,
        table_name: &str,
    ) -> Result<Option<LayerMeta>, LayerError> {
        let row = sqlx::query(
            "SELECT layer_name, scenario_id, algorithm_id, table_name, geometry_kind,
                    columns, created_at
             FROM result_layers WHERE table_name = $1",
        )
        .bind(table_name)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(meta_from_row).transpose()
    }

    async fn create_physical_table(
        tx: &mut Transaction<'_, Postgres>,
        meta: &LayerMeta,
    ) -> Result<(), LayerError> {
        let mut ddl = format!(
            "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, geom TEXT NOT NULL",
            quote_ident(&meta.table_name)
        );
        for col in &meta.schema.columns {
            ddl.push_str(&format!(
                ", {} {}",
                quote_ident(&col.name),
                col.data_type.sql_type()
            ));
        }
        ddl.push(')');

        sqlx::query(&ddl).execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        meta: &LayerMeta,
        rows: &[FeatureRow],
    ) -> Result<(), LayerError> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = insert_row_sql(meta);
        for row in rows {
            bind_row(sqlx::query(&sql), &meta.schema, row)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn insert_aggregates(
        tx: &mut Transaction<'_, Postgres>,
        table_name: &str,
        aggregates: &[AggregatedValue],
    ) -> Result<(), LayerError> {
        for agg in aggregates {
            sqlx::query(
                "INSERT INTO layer_aggregated_values (table_name, name, value, unit)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(table_name)
            .bind(&agg.name)
            .bind(agg.value)
            .bind(&agg.unit)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_meta(
        tx: &mut Transaction<'_, Postgres>,
        meta: &LayerMeta,
    ) -> Result<(), LayerError> {
        sqlx::query(
            "INSERT INTO result_layers
                 (layer_name, scenario_id, algorithm_id, table_name, geometry_kind, columns, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&meta.name)
        .bind(meta.scenario_id)
        .bind(&meta.algorithm_id)
        .bind(&meta.table_name)
        .bind(meta.schema.geometry_kind.as_str())
        .bind(serde_json::to_value(&meta.schema.columns)?)
        .bind(meta.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Drop the physical table (if present), then the metadata row. Ordering
    /// matters: a metadata row without a table is harmless, an orphaned
    /// table would be rediscovered later as stale state.
    async fn drop_layer(
        tx: &mut Transaction<'_, Postgres>,
        table_name: &str,
    ) -> Result<bool, LayerError> {
        if Self::physical_table_exists(tx, table_name).await? {
            sqlx::query(&format!("DROP TABLE {}", quote_ident(table_name)))
                .execute(&mut **tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM result_layers WHERE table_name = $1")
            .bind(table_name)
            .execute(&mut **tx)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl LayerStore for PgLayerStore {
    async fn create_or_replace(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
        result: &RunResult,
    ) -> Result<LayerMeta, LayerError> {
        let (meta, rows) = prepare_layer(scenario_id, algorithm_id, result)?;
        let mut tx = self.pool.begin().await?;
        Self::lock_key(&mut tx, &meta.table_name).await?;

        let existing = Self::fetch_meta(&mut tx, &meta.table_name).await?;
        let stored = match existing {
            Some(old) if old.schema.same_shape(&meta.schema) => {
                info!(table = %meta.table_name, "reusing result table, truncating rows");
                if Self::physical_table_exists(&mut tx, &meta.table_name).await? {
                    sqlx::query(&format!("TRUNCATE {}", quote_ident(&meta.table_name)))
                        .execute(&mut *tx)
                        .await?;
                } else {
                    // Metadata survived but the table is gone; recreate it.
                    warn!(table = %meta.table_name, "physical table missing, recreating");
                    Self::create_physical_table(&mut tx, &meta).await?;
                }
                sqlx::query("DELETE FROM layer_aggregated_values WHERE table_name = $1")
                    .bind(&meta.table_name)
                    .execute(&mut *tx)
                    .await?;
                Self::insert_rows(&mut tx, &old, &rows).await?;
                Self::insert_aggregates(&mut tx, &meta.table_name, &result.aggregated_values)
                    .await?;
                old
            }
            other => {
                if other.is_some() {
                    info!(table = %meta.table_name, "result shape changed, replacing table");
                    Self::drop_layer(&mut tx, &meta.table_name).await?;
                } else if Self::physical_table_exists(&mut tx, &meta.table_name).await? {
                    // No metadata but a leftover table with this name.
                    warn!(table = %meta.table_name, "dropping orphaned result table");
                    sqlx::query(&format!("DROP TABLE {}", quote_ident(&meta.table_name)))
                        .execute(&mut *tx)
                        .await?;
                }
                Self::insert_meta(&mut tx, &meta).await?;
                Self::create_physical_table(&mut tx, &meta).await?;
                Self::insert_rows(&mut tx, &meta, &rows).await?;
                Self::insert_aggregates(&mut tx, &meta.table_name, &result.aggregated_values)
                    .await?;
                meta
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn append(&self, layer: &LayerMeta, feature: &Feature) -> Result<(), LayerError> {
        let row = feature_row(feature, &layer.schema);
        let sql = insert_row_sql(layer);
        bind_row(sqlx::query(&sql), &layer.schema, &row)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn read(&self, layer: &LayerMeta) -> Result<Vec<FeatureRow>, LayerError> {
        let mut select = String::from("SELECT geom");
        for col in &layer.schema.columns {
            select.push_str(", ");
            select.push_str(&quote_ident(&col.name));
        }
        select.push_str(&format!(
            " FROM {} ORDER BY id",
            quote_ident(&layer.table_name)
        ));

        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let geom: String = row.try_get("geom")?;
                let mut columns = indexmap::IndexMap::new();
                for col in &layer.schema.columns {
                    columns.insert(col.name.clone(), read_column(row, col)?);
                }
                Ok(FeatureRow { geom, columns })
            })
            .collect()
    }

    async fn aggregated_values(
        &self,
        layer: &LayerMeta,
    ) -> Result<Vec<AggregatedValue>, LayerError> {
        let rows = sqlx::query(
            "SELECT name, value, unit FROM layer_aggregated_values
             WHERE table_name = $1 ORDER BY id",
        )
        .bind(&layer.table_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AggregatedValue {
                    name: row.try_get("name")?,
                    value: row.try_get("value")?,
                    unit: row.try_get("unit")?,
                })
            })
            .collect()
    }

    async fn get(
        &self,
        scenario_id: Uuid,
        algorithm_id: &str,
    ) -> Result<Option<LayerMeta>, LayerError> {
        let row = sqlx::query(
            "SELECT layer_name, scenario_id, algorithm_id, table_name, geometry_kind,
                    columns, created_at
             FROM result_layers WHERE scenario_id = $1 AND algorithm_id = $2",
        )
        .bind(scenario_id)
        .bind(algorithm_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(meta_from_row).transpose()
    }

    async fn list(&self, scenario_id: Uuid) -> Result<Vec<LayerMeta>, LayerError> {
        let rows = sqlx::query(
            "SELECT layer_name, scenario_id, algorithm_id, table_name, geometry_kind,
                    columns, created_at
             FROM result_layers WHERE scenario_id = $1 ORDER BY algorithm_id",
        )
        .bind(scenario_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(meta_from_row).collect()
    }

    async fn delete(&self, scenario_id: Uuid, algorithm_id: &str) -> Result<(), LayerError> {
        let table_name = result_table_name(scenario_id, algorithm_id);
        let mut tx = self.pool.begin().await?;
        Self::lock_key(&mut tx, &table_name).await?;
        let removed = Self::drop_layer(&mut tx, &table_name).await?;
        tx.commit().await?;
        if removed {
            info!(table = %table_name, "deleted result layer");
        }
        Ok(())
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError> {
        let layers = self.list(scenario_id).await?;
        let mut removed = 0;
        for layer in &layers {
            self.delete(scenario_id, &layer.algorithm_id).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

// ── Running-job records ──────────────────────────────────────────

pub struct PgJobRecordStore {
    pool: PgPool,
}

impl PgJobRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRecordStore for PgJobRecordStore {
    async fn insert(&self, job: &RunningJob) -> Result<(), LayerError> {
        sqlx::query(
            "INSERT INTO running_jobs (job_id, scenario_id, algorithm_id, dispatched_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(job.job_id)
        .bind(job.scenario_id)
        .bind(&job.algorithm_id)
        .bind(job.dispatched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn for_scenario(&self, scenario_id: Uuid) -> Result<Vec<RunningJob>, LayerError> {
        let jobs = sqlx::query_as::<_, RunningJob>(
            "SELECT job_id, scenario_id, algorithm_id, dispatched_at
             FROM running_jobs WHERE scenario_id = $1 ORDER BY dispatched_at",
        )
        .bind(scenario_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn delete_scenario(&self, scenario_id: Uuid) -> Result<usize, LayerError> {
        let deleted = sqlx::query("DELETE FROM running_jobs WHERE scenario_id = $1")
            .bind(scenario_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() as usize)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Advisory-lock key derived from the table name.
fn advisory_key(table_name: &str) -> i64 {
    let digest = Sha256::digest(table_name.as_bytes());
    i64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

fn insert_row_sql(meta: &LayerMeta) -> String {
    let mut columns = String::from("geom");
    let mut placeholders = String::from("$1");
    for (i, col) in meta.schema.columns.iter().enumerate() {
        columns.push_str(", ");
        columns.push_str(&quote_ident(&col.name));
        placeholders.push_str(&format!(", ${}", i + 2));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&meta.table_name),
        columns,
        placeholders
    )
}

fn bind_row<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    schema: &LayerSchema,
    row: &'q FeatureRow,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    let mut query = query.bind(&row.geom);
    for col in &schema.columns {
        let value = row
            .columns
            .get(&col.name)
            .unwrap_or(&serde_json::Value::Null);
        query = match col.data_type {
            ColumnType::Float => query.bind(value.as_f64()),
            ColumnType::Int => query.bind(value.as_i64()),
            ColumnType::Bool => query.bind(value.as_bool()),
            ColumnType::Text => query.bind(match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
        };
    }
    query
}

fn read_column(row: &sqlx::postgres::PgRow, col: &ColumnDef) -> Result<serde_json::Value, LayerError> {
    let value = match col.data_type {
        ColumnType::Float => row
            .try_get::<Option<f64>, _>(col.name.as_str())?
            .map(|v| serde_json::json!(v)),
        ColumnType::Int => row
            .try_get::<Option<i64>, _>(col.name.as_str())?
            .map(|v| serde_json::json!(v)),
        ColumnType::Bool => row
            .try_get::<Option<bool>, _>(col.name.as_str())?
            .map(|v| serde_json::json!(v)),
        ColumnType::Text => row
            .try_get::<Option<String>, _>(col.name.as_str())?
            .map(serde_json::Value::String),
    };
    Ok(value.unwrap_or(serde_json::Value::Null))
}

fn meta_from_row(row: sqlx::postgres::PgRow) -> Result<LayerMeta, LayerError> {
    let geometry_kind: String = row.try_get("geometry_kind")?;
    let columns: serde_json::Value = row.try_get("columns")?;
    Ok(LayerMeta {
        name: row.try_get("layer_name")?,
        scenario_id: row.try_get("scenario_id")?,
        algorithm_id: row.try_get("algorithm_id")?,
        table_name: row.try_get("table_name")?,
        schema: LayerSchema {
            geometry_kind: GeometryKind::parse(&geometry_kind)?,
            columns: serde_json::from_value(columns)?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use geo_types::point;
    use serde_json::json;

    use super::*;

    #[test]
    fn advisory_key_is_stable() {
        let a = advisory_key("result_0011223344556677");
        let b = advisory_key("result_0011223344556677");
        assert_eq!(a, b);
        assert_ne!(a, advisory_key("result_ffeeddccbbaa9988"));
    }

    #[test]
    fn insert_sql_quotes_identifiers() {
        let (meta, _) = {
            let mut result = RunResult::new("point");
            result.features = Some(vec![
                Feature::new(point!(x: 0.0, y: 0.0)).with_property("avg", json!(1.0))
            ]);
            prepare_layer(Uuid::new_v4(), "avg_point_yield", &result).unwrap()
        };

        let sql = insert_row_sql(&meta);
        assert!(sql.contains("(geom, \"avg\")"));
        assert!(sql.contains("VALUES ($1, $2)"));
    }

    /// Full round trip against a live database. Requires
    /// `BIOFLOW_TEST_DATABASE_URL`; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn pg_round_trip() {
        let url = std::env::var("BIOFLOW_TEST_DATABASE_URL")
            .expect("set BIOFLOW_TEST_DATABASE_URL to run this test");
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("../../migrations").run(&pool).await.unwrap();

        let store = PgLayerStore::new(pool);
        let scenario = Uuid::new_v4();

        let mut result = RunResult::new("point");
        result
            .aggregated_values
            .push(AggregatedValue::new("Count", 2.0, ""));
        result.features = Some(vec![
            Feature::new(point!(x: 0.0, y: 0.0)).with_property("avg", json!(5.0)),
            Feature::new(point!(x: 1.0, y: 1.0)).with_property("avg", json!(5.0)),
        ]);

        let meta = store
            .create_or_replace(scenario, "avg_point_yield", &result)
            .await
            .unwrap();
        assert_eq!(store.read(&meta).await.unwrap().len(), 2);

        // Identical shape: truncate-and-reinsert keeps the row count stable.
        let meta = store
            .create_or_replace(scenario, "avg_point_yield", &result)
            .await
            .unwrap();
        assert_eq!(store.read(&meta).await.unwrap().len(), 2);
        assert_eq!(store.aggregated_values(&meta).await.unwrap().len(), 1);

        store.delete(scenario, "avg_point_yield").await.unwrap();
        store.delete(scenario, "avg_point_yield").await.unwrap();
        assert!(store.get(scenario, "avg_point_yield").await.unwrap().is_none());
    }
}
