//! Helper constructors for [`OCRError`].
//!
//! Structured variants carry several fields; these helpers keep call sites
//! short and make the context strings consistent across adapters.

use super::types::{OCRError, ProcessingStage};

/// Builder for composing detailed `ModelInference` errors without duplicating boilerplate.
#[derive(Clone, Debug)]
pub struct ModelInferenceErrorBuilder {
    model_name: String,
    operation: String,
    step: usize,
    input_shape: Vec<usize>,
    context: String,
}

impl ModelInferenceErrorBuilder {
    /// Creates a new builder with the required model metadata.
    pub fn new(model_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            operation: operation.into(),
            step: 0,
            input_shape: Vec::new(),
            context: String::new(),
        }
    }

    /// Sets the decode step associated with the failure.
    pub fn step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Stores the input tensor shape for contextual debugging.
    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = shape.to_vec();
        self
    }

    /// Adds free-form context to the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Consumes the builder and produces the final `OCRError`.
    pub fn build(self, error: impl std::error::Error + Send + Sync + 'static) -> OCRError {
        OCRError::ModelInference {
            model_name: self.model_name,
            operation: self.operation,
            step: self.step,
            input_shape: self.input_shape,
            context: self.context,
            source: Box::new(error),
        }
    }
}

impl OCRError {
    /// Creates a `ModelUnavailable` error.
    pub fn model_unavailable(reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidImage` error without an underlying cause.
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an `InvalidImage` error wrapping the decoder failure.
    pub fn invalid_image_with_source(
        message: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::InvalidImage {
            message: message.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a processing error for the given pipeline stage.
    ///
    /// # Arguments
    ///
    /// * `kind` - The stage where the error occurred.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a `ConfigError`.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates an OCRError for inference operations with model context.
    ///
    /// # Arguments
    ///
    /// * `model_name` - The name of the model where inference failed.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn inference_error(
        model_name: &str,
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates an OCRError for a failed model operation.
    ///
    /// # Arguments
    ///
    /// * `model_name` - The name of the model where inference failed.
    /// * `operation` - The operation that failed.
    /// * `step` - The decode step (0 for single-shot models).
    /// * `input_shape` - The input tensor shape.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn model_inference_error(
        model_name: &str,
        operation: &str,
        step: usize,
        input_shape: &[usize],
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ModelInferenceErrorBuilder::new(model_name, operation)
            .step(step)
            .input_shape(input_shape)
            .context(context)
            .build(error)
    }

    /// Creates an OCRError for model load failures with contextual suggestions.
    ///
    /// # Arguments
    /// * `model_path` - Path to the model file
    /// * `reason` - Short reason description
    /// * `suggestion` - Optional suggestion message (without punctuation)
    /// * `source` - Optional underlying error
    pub fn model_load_error(
        model_path: impl AsRef<std::path::Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        let suggestion = suggestion
            .map(|s| format!("; suggested fix: {}", s))
            .unwrap_or_default();
        Self::ModelLoad {
            model_path: model_path.as_ref().display().to_string(),
            reason: reason.into(),
            suggestion,
            source: source.map(|e| Box::new(e) as _),
        }
    }

    /// Creates an OCRError for tensor operations with detailed shape information.
    ///
    /// # Arguments
    ///
    /// * `operation` - The tensor operation that failed.
    /// * `expected_shape` - The expected tensor shape.
    /// * `actual_shape` - The actual tensor shape.
    /// * `context` - Additional context about where the error occurred.
    /// * `error` - The underlying error that caused this error.
    pub fn tensor_operation_error(
        operation: &str,
        expected_shape: &[usize],
        actual_shape: &[usize],
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TensorOperation {
            operation: operation.to_string(),
            expected_shape: expected_shape.to_vec(),
            actual_shape: actual_shape.to_vec(),
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a `Cancelled` error.
    pub fn cancelled(steps: usize, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            steps,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ProcessingStage, SimpleError};

    #[test]
    fn test_model_load_error_formats_suggestion() {
        let err = OCRError::model_load_error(
            "models/encoder_model.onnx",
            "failed to create ONNX session",
            Some("verify the model file"),
            None::<SimpleError>,
        );
        let message = err.to_string();
        assert!(message.contains("models/encoder_model.onnx"));
        assert!(message.contains("suggested fix: verify the model file"));
    }

    #[test]
    fn test_model_inference_error_builder() {
        let err = ModelInferenceErrorBuilder::new("decoder_model_merged", "forward_pass")
            .step(7)
            .input_shape(&[1, 1])
            .context("engine rejected input")
            .build(SimpleError::new("boom"));
        match err {
            OCRError::ModelInference {
                step, input_shape, ..
            } => {
                assert_eq!(step, 7);
                assert_eq!(input_shape, vec![1, 1]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_client_error_classification() {
        assert!(OCRError::invalid_image("not an image").is_client_error());
        assert!(!OCRError::model_unavailable("no model").is_client_error());
        assert!(!OCRError::cancelled(3, "deadline").is_client_error());
        assert!(
            !OCRError::processing(
                ProcessingStage::Decoding,
                "failed to decode token id 9",
                SimpleError::new("unknown id"),
            )
            .is_client_error()
        );
    }

    #[test]
    fn test_engine_errors_carry_engine_message() {
        let err = OCRError::model_inference_error(
            "encoder_model",
            "forward_pass",
            0,
            &[1, 3, 448, 448],
            "ONNX Runtime inference failed",
            SimpleError::new("Got invalid dimensions for input"),
        );
        assert!(err.to_string().ends_with("ONNX Runtime inference failed: Got invalid dimensions for input"));

        let err = OCRError::inference_error("decoder", "run failed", SimpleError::new("bad alloc"));
        assert!(err.to_string().contains("bad alloc"));
    }
}
