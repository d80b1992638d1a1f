pub mod clip;

pub use clip::{clip_features, ClipError, ClippedFeature};
