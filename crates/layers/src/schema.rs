//! Column inference and table naming for result layers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use bioflow_core::Feature;

use crate::error::LayerError;

/// Whitelisted geometry column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    MultiPoint,
    Line,
    MultiLine,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    /// Parse a declared geometry kind; anything off the whitelist fails.
    /// Hyphens/underscores and case are insignificant ("multi-polygon" works).
    pub fn parse(kind: &str) -> Result<Self, LayerError> {
        let normalized: String = kind
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "point" => Ok(GeometryKind::Point),
            "multipoint" => Ok(GeometryKind::MultiPoint),
            "line" | "linestring" => Ok(GeometryKind::Line),
            "multiline" | "multilinestring" => Ok(GeometryKind::MultiLine),
            "polygon" => Ok(GeometryKind::Polygon),
            "multipolygon" => Ok(GeometryKind::MultiPolygon),
            _ => Err(LayerError::InvalidGeometryKind(kind.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::MultiPoint => "multipoint",
            GeometryKind::Line => "line",
            GeometryKind::MultiLine => "multiline",
            GeometryKind::Polygon => "polygon",
            GeometryKind::MultiPolygon => "multipolygon",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storable column types, inferred from feature property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Float,
    Int,
    Text,
    Bool,
}

impl ColumnType {
    /// Infer a column type from a single value. Nulls carry no type.
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Int),
            Value::Number(_) => Some(ColumnType::Float),
            Value::String(_) => Some(ColumnType::Text),
            // Nested values are stored as their JSON text.
            Value::Array(_) | Value::Object(_) => Some(ColumnType::Text),
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Float => "double precision",
            ColumnType::Int => "bigint",
            ColumnType::Text => "text",
            ColumnType::Bool => "boolean",
        }
    }
}

/// One declared column of a result layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
}

/// The shape of a result layer: geometry kind plus column definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSchema {
    pub geometry_kind: GeometryKind,
    pub columns: Vec<ColumnDef>,
}

impl LayerSchema {
    /// Infer the column set from a feature list.
    ///
    /// The first non-null value seen for a property decides its type; column
    /// order follows first appearance. Properties that hold null in every
    /// feature are omitted from the schema; the returned list names them so
    /// the omission stays observable.
    pub fn infer(geometry_kind: GeometryKind, features: &[Feature]) -> (Self, Vec<String>) {
        let mut seen: IndexMap<String, Option<ColumnType>> = IndexMap::new();

        for feature in features {
            for (name, value) in &feature.properties {
                let slot = seen.entry(name.clone()).or_insert(None);
                if slot.is_none() {
                    *slot = ColumnType::of_value(value);
                }
            }
        }

        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for (name, data_type) in seen {
            match data_type {
                Some(data_type) => columns.push(ColumnDef { name, data_type }),
                None => dropped.push(name),
            }
        }

        if !dropped.is_empty() {
            warn!(
                columns = ?dropped,
                "omitting columns with no non-null values from layer schema"
            );
        }

        (
            Self {
                geometry_kind,
                columns,
            },
            dropped,
        )
    }

    /// Two schemas describe the same physical shape when geometry kind and
    /// column set match; column order is irrelevant.
    pub fn same_shape(&self, other: &Self) -> bool {
        if self.geometry_kind != other.geometry_kind {
            return false;
        }
        let mut a: Vec<_> = self.columns.iter().collect();
        let mut b: Vec<_> = other.columns.iter().collect();
        a.sort_by(|x, y| x.name.cmp(&y.name));
        b.sort_by(|x, y| x.name.cmp(&y.name));
        a == b
    }
}

/// Deterministic physical table name for a (scenario, algorithm) pair.
///
/// Repeated runs of the same pair address the same table. The digest keeps
/// the name a valid identifier regardless of key formats.
pub fn result_table_name(scenario_id: Uuid, algorithm_id: &str) -> String {
    let digest = Sha256::digest(format!("{scenario_id}:{algorithm_id}"));
    let hex = format!("{digest:x}");
    format!("result_{}", &hex[..16])
}
