//! Injected feature datasets consumed by inventory algorithms.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use bioflow_core::Feature;

use crate::error::AlgorithmError;

/// A named dataset of geometric input features (e.g. street trees, parks).
///
/// Implementations wrap whatever actually holds the data (an in-memory
/// fixture, a database table, a file). Algorithms only see this seam.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Dataset identifier this source serves.
    fn dataset(&self) -> &str;

    /// All features of the dataset.
    async fn features(&self) -> Result<Vec<Feature>, AlgorithmError>;
}

/// In-memory feature source, used in tests and small deployments.
pub struct MemoryFeatureSource {
    dataset: String,
    features: Vec<Feature>,
}

impl MemoryFeatureSource {
    pub fn new(dataset: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            dataset: dataset.into(),
            features,
        }
    }
}

#[async_trait]
impl FeatureSource for MemoryFeatureSource {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn features(&self) -> Result<Vec<Feature>, AlgorithmError> {
        Ok(self.features.clone())
    }
}

/// Lookup table from dataset identifier to feature source, built once at
/// startup alongside the algorithm registry.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn FeatureSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn FeatureSource>) {
        self.sources.insert(source.dataset().to_string(), source);
    }

    pub fn resolve(&self, dataset: &str) -> Result<Arc<dyn FeatureSource>, AlgorithmError> {
        self.sources
            .get(dataset)
            .cloned()
            .ok_or_else(|| AlgorithmError::UnknownDataset(dataset.to_string()))
    }

    pub fn datasets(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    #[tokio::test]
    async fn memory_source_round_trip() {
        let source =
            MemoryFeatureSource::new("trees", vec![Feature::new(point!(x: 1.0, y: 2.0))]);
        assert_eq!(source.dataset(), "trees");
        assert_eq!(source.features().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn registry_resolves_registered_dataset() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MemoryFeatureSource::new("trees", vec![])));

        assert!(registry.resolve("trees").is_ok());
        let err = registry.resolve("rivers").err().unwrap();
        assert!(matches!(err, AlgorithmError::UnknownDataset(d) if d == "rivers"));
    }
}
