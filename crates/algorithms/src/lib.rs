pub mod area_yield;
pub mod error;
pub mod params;
pub mod point_yield;
pub mod registry;
pub mod source;

pub use area_yield::AvgAreaYield;
pub use error::AlgorithmError;
pub use params::{ParamSetting, ParameterDef, ParameterMap, ParameterStore, ParameterValue};
pub use point_yield::AvgPointYield;
pub use registry::{AlgorithmContext, AlgorithmRegistry, InventoryAlgorithm};
pub use source::{FeatureSource, MemoryFeatureSource, SourceRegistry};
