//! Polygon clipping against a set of mask geometries.
//!
//! Pure and restartable: no shared mutable state, parallelized per mask
//! geometry via rayon.

use geo::{BooleanOps, GeodesicArea, Intersects};
use geo_types::{Geometry, MultiPolygon};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use bioflow_core::Feature;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("empty input: {0}")]
    EmptyInput(&'static str),
}

/// One clipped piece of an input feature.
#[derive(Debug, Clone)]
pub struct ClippedFeature {
    pub geom: MultiPolygon<f64>,
    /// Geodesic area of the clipped geometry in m².
    pub area: f64,
    /// Requested subset of the original feature's columns.
    pub properties: IndexMap<String, Value>,
}

/// Intersect `inputs` with `masks`, keeping the requested columns.
///
/// For every input geometry that intersects a mask geometry, the output
/// carries the geometric intersection, its geodesic area, and the
/// `keep_columns` subset of the input's properties. Column names that do
/// not exist on the input are silently dropped. Intersections that resolve
/// to an empty geometry are discarded. Coordinates are expected in lon/lat
/// (EPSG:4326), which is what the geodesic area computation assumes.
///
/// Non-areal input geometries cannot be clipped and are skipped.
pub fn clip_features(
    inputs: &[Feature],
    masks: &[MultiPolygon<f64>],
    keep_columns: &[String],
) -> Result<Vec<ClippedFeature>, ClipError> {
    if inputs.is_empty() {
        return Err(ClipError::EmptyInput("input features"));
    }
    if masks.is_empty() {
        return Err(ClipError::EmptyInput("mask geometries"));
    }

    let areal: Vec<(&Feature, MultiPolygon<f64>)> = inputs
        .iter()
        .filter_map(|f| as_multi_polygon(&f.geom).map(|mp| (f, mp)))
        .collect();

    if areal.len() < inputs.len() {
        debug!(
            skipped = inputs.len() - areal.len(),
            "skipping non-areal input geometries"
        );
    }

    let clipped: Vec<ClippedFeature> = masks
        .par_iter()
        .flat_map_iter(|mask| {
            areal
                .iter()
                .filter(|(_, geom)| geom.intersects(mask))
                .filter_map(|(feature, geom)| {
                    let intersection = geom.intersection(mask);
                    if intersection.0.is_empty() {
                        return None;
                    }
                    let area = intersection.geodesic_area_unsigned();
                    Some(ClippedFeature {
                        geom: intersection,
                        area,
                        properties: keep_properties(feature, keep_columns),
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(clipped)
}

/// Pick the requested columns off a feature, in request order.
fn keep_properties(feature: &Feature, keep_columns: &[String]) -> IndexMap<String, Value> {
    keep_columns
        .iter()
        .filter_map(|name| {
            feature
                .properties
                .get(name)
                .map(|value| (name.clone(), value.clone()))
        })
        .collect()
}

fn as_multi_polygon(geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon, Polygon};
    use serde_json::json;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
    }

    fn mask(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![square(x0, y0, x1, y1)])
    }

    #[test]
    fn empty_inputs_rejected() {
        let err = clip_features(&[], &[mask(0.0, 0.0, 1.0, 1.0)], &[]).unwrap_err();
        assert!(matches!(err, ClipError::EmptyInput("input features")));

        let feature = Feature::new(square(0.0, 0.0, 1.0, 1.0));
        let err = clip_features(&[feature], &[], &[]).unwrap_err();
        assert!(matches!(err, ClipError::EmptyInput("mask geometries")));
    }

    #[test]
    fn overlapping_parts_mask_covering_one() {
        // One input feature made of two overlapping polygons; the mask covers
        // exactly the first of them.
        let input = Feature::new(Geometry::MultiPolygon(MultiPolygon(vec![
            square(0.0, 0.0, 1.0, 1.0),
            square(0.5, 0.5, 1.5, 1.5),
        ])));
        let full_area = MultiPolygon(vec![
            square(0.0, 0.0, 1.0, 1.0),
            square(0.5, 0.5, 1.5, 1.5),
        ])
        .geodesic_area_unsigned();

        let clipped = clip_features(&[input], &[mask(0.0, 0.0, 1.0, 1.0)], &[]).unwrap();

        assert_eq!(clipped.len(), 1);
        assert!(clipped[0].area > 0.0);
        assert!(clipped[0].area <= full_area);
    }

    #[test]
    fn disjoint_feature_not_clipped() {
        let inside = Feature::new(square(0.0, 0.0, 1.0, 1.0));
        let outside = Feature::new(square(10.0, 10.0, 11.0, 11.0));

        let clipped =
            clip_features(&[inside, outside], &[mask(0.0, 0.0, 2.0, 2.0)], &[]).unwrap();
        assert_eq!(clipped.len(), 1);
    }

    #[test]
    fn partial_overlap_shrinks_area() {
        let input = Feature::new(square(0.0, 0.0, 1.0, 1.0));
        let full_area = MultiPolygon(vec![square(0.0, 0.0, 1.0, 1.0)]).geodesic_area_unsigned();

        // Mask covers the left half of the square.
        let clipped = clip_features(&[input], &[mask(0.0, 0.0, 0.5, 1.0)], &[]).unwrap();

        assert_eq!(clipped.len(), 1);
        assert!(clipped[0].area > 0.0);
        assert!(clipped[0].area < full_area);
    }

    #[test]
    fn keep_columns_subset() {
        let input = Feature::new(square(0.0, 0.0, 1.0, 1.0))
            .with_property("species", json!("oak"))
            .with_property("count", json!(12));

        let keep = vec!["count".to_string(), "no_such_column".to_string()];
        let clipped = clip_features(&[input], &[mask(0.0, 0.0, 1.0, 1.0)], &keep).unwrap();

        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].properties.len(), 1);
        assert_eq!(clipped[0].properties["count"], json!(12));
    }

    #[test]
    fn point_inputs_skipped() {
        let point_feature = Feature::new(point!(x: 0.5, y: 0.5));
        let poly_feature = Feature::new(square(0.0, 0.0, 1.0, 1.0));

        let clipped = clip_features(
            &[point_feature, poly_feature],
            &[mask(0.0, 0.0, 1.0, 1.0)],
            &[],
        )
        .unwrap();
        assert_eq!(clipped.len(), 1);
    }
}
