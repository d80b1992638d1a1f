//! Point-yield family: a uniform per-point yield applied to every point
//! feature inside the catchment.

use async_trait::async_trait;
use geo::Intersects;
use geo_types::Geometry;
use serde_json::Value;

use bioflow_core::{AggregatedValue, Feature, RunResult};

use crate::error::AlgorithmError;
use crate::params::ParameterDef;
use crate::registry::{AlgorithmContext, InventoryAlgorithm};

pub struct AvgPointYield {
    dataset: String,
    parameters: Vec<ParameterDef>,
}

impl AvgPointYield {
    pub const ID: &'static str = "avg_point_yield";

    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            parameters: vec![ParameterDef::required("point_yield", "Mg/a")],
        }
    }
}

#[async_trait]
impl InventoryAlgorithm for AvgPointYield {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Average point yield"
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    async fn run(&self, ctx: &AlgorithmContext) -> Result<RunResult, AlgorithmError> {
        let point_yield = *ctx.params.require("point_yield")?;

        let inside: Vec<Feature> = ctx
            .source
            .features()
            .await?
            .into_iter()
            .filter(|f| match &f.geom {
                Geometry::Point(p) => p.intersects(&ctx.catchment),
                _ => false,
            })
            .collect();

        let count = inside.len();
        let total_production = point_yield.value * count as f64;

        let features = inside
            .into_iter()
            .map(|point| {
                Feature::new(point.geom)
                    .with_property("point_yield_average", point_yield.value)
                    .with_property(
                        "point_yield_standard_deviation",
                        point_yield
                            .standard_deviation
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    )
            })
            .collect();

        let mut result = RunResult::new("point");
        result
            .aggregated_values
            .push(AggregatedValue::new("Count", count as f64, ""));
        result.aggregated_values.push(AggregatedValue::new(
            "Total production",
            total_production,
            "Mg/a",
        ));
        result.features = Some(features);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geo_types::{point, polygon, MultiPolygon};
    use uuid::Uuid;

    use crate::params::{ParamSetting, ParameterMap};
    use crate::source::MemoryFeatureSource;

    use super::*;

    fn catchment() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]])
    }

    fn context(features: Vec<Feature>, params: ParameterMap) -> AlgorithmContext {
        AlgorithmContext {
            scenario_id: Uuid::new_v4(),
            feedstock_id: Uuid::new_v4(),
            catchment: catchment(),
            source: Arc::new(MemoryFeatureSource::new("trees", features)),
            params,
        }
    }

    #[tokio::test]
    async fn ten_points_at_five_each() {
        let mut features: Vec<Feature> = (0..10)
            .map(|i| Feature::new(point!(x: 1.0 + i as f64 * 0.5, y: 5.0)))
            .collect();
        // Outside the catchment, must not count.
        features.push(Feature::new(point!(x: 50.0, y: 50.0)));

        let mut params = ParameterMap::new();
        params.insert(
            "point_yield",
            ParamSetting {
                value: 5.0,
                standard_deviation: Some(0.5),
            },
        );

        let result = AvgPointYield::new("trees")
            .run(&context(features, params))
            .await
            .unwrap();

        let total = result
            .aggregated_values
            .iter()
            .find(|a| a.name == "Total production")
            .unwrap();
        assert_eq!(total.value, 50.0);
        assert_eq!(total.unit, "Mg/a");

        let count = result
            .aggregated_values
            .iter()
            .find(|a| a.name == "Count")
            .unwrap();
        assert_eq!(count.value, 10.0);
        assert_eq!(result.feature_count(), 10);
    }

    #[tokio::test]
    async fn missing_required_parameter() {
        let err = AvgPointYield::new("trees")
            .run(&context(vec![], ParameterMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AlgorithmError::MissingRequiredParameter(p) if p == "point_yield"));
    }

    #[tokio::test]
    async fn no_points_yields_zero() {
        let mut params = ParameterMap::new();
        params.insert(
            "point_yield",
            ParamSetting {
                value: 5.0,
                standard_deviation: None,
            },
        );

        let result = AvgPointYield::new("trees")
            .run(&context(vec![], params))
            .await
            .unwrap();

        let total = result
            .aggregated_values
            .iter()
            .find(|a| a.name == "Total production")
            .unwrap();
        assert_eq!(total.value, 0.0);
        assert_eq!(result.feature_count(), 0);
        // Zero features is a legitimate result, not an omitted feature list.
        assert!(result.features.is_some());
    }
}
