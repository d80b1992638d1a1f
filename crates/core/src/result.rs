//! Output types produced by inventory algorithm runs.

use geo_types::Geometry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named aggregate computed over a whole run (e.g. "Total production").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedValue {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

impl AggregatedValue {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
        }
    }
}

/// One geometric feature produced by an algorithm run.
///
/// Property order is preserved; the first feature's properties drive the
/// column order of the stored result table.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geom: Geometry<f64>,
    pub properties: IndexMap<String, Value>,
}

impl Feature {
    pub fn new(geom: impl Into<Geometry<f64>>) -> Self {
        Self {
            geom: geom.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// The complete output of one algorithm run.
///
/// `features` distinguishes "the run produced no features" (`Some(vec![])`)
/// from "the run did not report a feature list at all" (`None`); the schema
/// manager rejects the latter.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub aggregated_values: Vec<AggregatedValue>,
    /// Declared geometry kind of the feature list (e.g. "point", "multipolygon").
    pub geometry_kind: String,
    pub features: Option<Vec<Feature>>,
}

impl RunResult {
    pub fn new(geometry_kind: impl Into<String>) -> Self {
        Self {
            aggregated_values: Vec::new(),
            geometry_kind: geometry_kind.into(),
            features: Some(Vec::new()),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    #[test]
    fn feature_preserves_property_order() {
        let feature = Feature::new(point!(x: 1.0, y: 2.0))
            .with_property("b_second", 2.0)
            .with_property("a_first", 1.0);
        let keys: Vec<_> = feature.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["b_second", "a_first"]);
    }

    #[test]
    fn run_result_counts_features() {
        let mut result = RunResult::new("point");
        assert_eq!(result.feature_count(), 0);
        result
            .features
            .as_mut()
            .unwrap()
            .push(Feature::new(point!(x: 0.0, y: 0.0)));
        assert_eq!(result.feature_count(), 1);

        result.features = None;
        assert_eq!(result.feature_count(), 0);
    }
}
