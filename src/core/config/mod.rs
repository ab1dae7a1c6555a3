//! Configuration types for the pipeline, its models and ONNX Runtime.

pub mod errors;
pub mod model;
pub mod onnx;
pub mod preprocess;

pub use errors::{ConfigError, ConfigValidator};
pub use model::{DEFAULT_MAX_STEPS, DEFAULT_REPETITION_THRESHOLD, DecoderConfig, MixTexConfig};
pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use preprocess::{
    DEFAULT_CANVAS_SIZE, FEATURE_EXTRACTOR_CONFIG_VERSION, FeatureExtractorConfig, ImageSize,
};
