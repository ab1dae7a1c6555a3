//! The core module of the pipeline.
//!
//! This module contains the building blocks every other module relies on:
//! - Configuration management
//! - Error handling
//! - ONNX Runtime session management
//! - The decoder key/value cache
//! - Traits the pipeline uses to reach models and the tokenizer

pub mod config;
pub mod errors;
pub mod inference;
pub mod kv_cache;
pub mod traits;

pub use config::{
    ConfigError, ConfigValidator, DecoderConfig, FeatureExtractorConfig, ImageSize, MixTexConfig,
    OrtSessionConfig,
};
pub use errors::{OCRError, OcrResult, ProcessingStage};
pub use inference::{OrtInfer, load_session};
pub use kv_cache::{CacheLayout, KvCache, KvKind};
pub use traits::{DecoderStepInput, DecoderStepOutput, TextDecoder, TokenDecoder, VisionEncoder};

/// `(batch, channels, height, width)` image tensor.
pub type Tensor4D = ndarray::Array4<f32>;

/// `(batch, sequence, features)` tensor.
pub type Tensor3D = ndarray::Array3<f32>;
