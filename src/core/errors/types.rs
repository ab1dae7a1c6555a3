//! Error type definitions for the OCR pipeline.

use std::fmt;
use thiserror::Error;

/// Stages of the image-to-LaTeX pipeline, used to annotate processing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Padding or resampling the bitmap onto the model canvas.
    CanvasNormalization,
    /// Converting the canvas into the encoder tensor.
    FeatureExtraction,
    /// The autoregressive decode loop.
    Decoding,
    /// Converting decoder text into LaTeX.
    PostProcessing,
    /// Decoding raw bytes or base64 payloads into a bitmap.
    ImageDecoding,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStage::CanvasNormalization => "canvas normalization",
            ProcessingStage::FeatureExtraction => "feature extraction",
            ProcessingStage::Decoding => "decoding",
            ProcessingStage::PostProcessing => "post-processing",
            ProcessingStage::ImageDecoding => "image decoding",
        };
        f.write_str(name)
    }
}

/// A minimal error carrying only a message, used as the `source` of
/// structured variants when no richer underlying error exists.
#[derive(Debug, Clone)]
pub struct SimpleError {
    message: String,
}

impl SimpleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SimpleError {}

/// Errors produced while turning an image into LaTeX.
///
/// The variants group into four families:
///
/// * model availability: [`OCRError::ModelUnavailable`], [`OCRError::ModelLoad`]
/// * caller input: [`OCRError::InvalidImage`], [`OCRError::ImageLoad`],
///   [`OCRError::ConfigError`]
/// * engine failures: [`OCRError::Inference`], [`OCRError::ModelInference`],
///   [`OCRError::TensorOperation`], [`OCRError::Session`], [`OCRError::Tensor`]
/// * request lifecycle: [`OCRError::Cancelled`]
///
/// Hitting the decode step limit is not an error; it is reported as
/// [`crate::pipeline::StopReason::MaxLength`] on a successful result.
#[derive(Error, Debug)]
pub enum OCRError {
    /// No model is loaded, so no request can be served.
    #[error("model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// The input bytes could not be decoded into a bitmap.
    #[error("invalid image: {message}")]
    InvalidImage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reading an image file failed.
    #[error("failed to load image")]
    ImageLoad(#[source] image::ImageError),

    /// A pipeline stage failed.
    #[error("{kind} failed: {context}: {source}")]
    Processing {
        kind: ProcessingStage,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The inference engine failed for a model.
    #[error("inference failed in model '{model_name}': {context}: {source}")]
    Inference {
        model_name: String,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The inference engine failed during a specific model operation.
    #[error(
        "model '{model_name}' failed during {operation} at step {step} (input shape {input_shape:?}): {context}: {source}"
    )]
    ModelInference {
        model_name: String,
        operation: String,
        step: usize,
        input_shape: Vec<usize>,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A tensor did not have the shape the model contract requires.
    #[error(
        "tensor operation '{operation}' failed: expected {expected_shape:?}, got {actual_shape:?} ({context})"
    )]
    TensorOperation {
        operation: String,
        expected_shape: Vec<usize>,
        actual_shape: Vec<usize>,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model or tokenizer file could not be loaded.
    #[error("failed to load model from '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        model_path: String,
        reason: String,
        suggestion: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration was invalid or could not be read.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// The request was cancelled or ran past its deadline before decoding finished.
    ///
    /// `steps` counts the decode steps completed before the signal was seen.
    #[error("request cancelled after {steps} decode steps: {reason}")]
    Cancelled { steps: usize, reason: String },

    /// Error surfaced by ONNX Runtime.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error building an ndarray view or array.
    #[error(transparent)]
    Tensor(#[from] ndarray::ShapeError),

    /// I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OCRError {
    /// Returns `true` when the failure was caused by the caller's input rather
    /// than by the model or engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, OCRError::InvalidImage { .. } | OCRError::ImageLoad(_))
    }
}
