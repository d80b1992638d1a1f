//! Area-yield family: polygon features are clipped to the catchment and each
//! clipped area is multiplied by a yield-per-area constant.

use async_trait::async_trait;
use geo_types::Geometry;

use bioflow_core::{AggregatedValue, Feature, RunResult};
use bioflow_gis::clip_features;

use crate::error::AlgorithmError;
use crate::params::ParameterDef;
use crate::registry::{AlgorithmContext, InventoryAlgorithm};

pub struct AvgAreaYield {
    dataset: String,
    keep_columns: Vec<String>,
    parameters: Vec<ParameterDef>,
}

impl AvgAreaYield {
    pub const ID: &'static str = "avg_area_yield";

    /// `keep_columns` names input columns carried into the clipped features;
    /// names the input does not have are silently dropped.
    pub fn new(dataset: impl Into<String>, keep_columns: Vec<String>) -> Self {
        Self {
            dataset: dataset.into(),
            keep_columns,
            parameters: vec![ParameterDef::required("area_yield", "kg/(m²*a)")],
        }
    }
}

#[async_trait]
impl InventoryAlgorithm for AvgAreaYield {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Average area yield"
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    async fn run(&self, ctx: &AlgorithmContext) -> Result<RunResult, AlgorithmError> {
        let area_yield = *ctx.params.require("area_yield")?;

        let inputs = ctx.source.features().await?;
        let clipped = clip_features(
            &inputs,
            std::slice::from_ref(&ctx.catchment),
            &self.keep_columns,
        )?;

        let mut total_area = 0.0;
        let mut total_production = 0.0;
        let mut features = Vec::with_capacity(clipped.len());

        for piece in clipped {
            total_area += piece.area;
            total_production += piece.area * area_yield.value;

            let mut feature = Feature::new(Geometry::MultiPolygon(piece.geom));
            feature.properties.extend(piece.properties);
            features.push(
                feature
                    .with_property("area", piece.area)
                    .with_property("yield_average", piece.area * area_yield.value),
            );
        }

        let mut result = RunResult::new("multipolygon");
        result
            .aggregated_values
            .push(AggregatedValue::new("Total area", total_area, "m²"));
        result.aggregated_values.push(AggregatedValue::new(
            "Total production",
            total_production,
            "kg",
        ));
        result.features = Some(features);

        Ok(result)
    }
}
