//! Vision encoder over ONNX Runtime.

use crate::core::config::OrtSessionConfig;
use crate::core::errors::{OCRError, SimpleError};
use crate::core::inference::{OrtInfer, shape_to_usize};
use crate::core::{Tensor3D, Tensor4D, VisionEncoder};
use ndarray::ArrayView3;
use ort::value::TensorRef;
use std::path::Path;

/// Name of the encoder's pixel input in exported vision-encoder-decoder graphs.
pub const PIXEL_VALUES_INPUT: &str = "pixel_values";

/// The exported `encoder_model.onnx`.
#[derive(Debug)]
pub struct OrtEncoder {
    inference: OrtInfer,
    input_name: String,
}

impl OrtEncoder {
    /// Loads the encoder graph.
    ///
    /// The input is looked up by name and falls back to the first declared
    /// input for graphs exported with a different name.
    pub fn load(model_path: impl AsRef<Path>, config: &OrtSessionConfig) -> Result<Self, OCRError> {
        let inference = OrtInfer::from_config(config, model_path.as_ref())?;
        let input_name = if inference.has_input(PIXEL_VALUES_INPUT) {
            PIXEL_VALUES_INPUT.to_string()
        } else {
            inference.input_names().first().cloned().ok_or_else(|| {
                OCRError::model_load_error(
                    inference.model_path(),
                    "encoder graph declares no inputs",
                    Some("re-export the encoder with a pixel_values input"),
                    None::<OCRError>,
                )
            })?
        };
        if inference.output_names().is_empty() {
            return Err(OCRError::model_load_error(
                inference.model_path(),
                "encoder graph declares no outputs",
                None,
                None::<OCRError>,
            ));
        }

        tracing::debug!(
            "encoder input '{}' shape {:?}",
            input_name,
            inference.primary_input_shape()
        );
        Ok(Self {
            inference,
            input_name,
        })
    }
}

impl VisionEncoder for OrtEncoder {
    fn encode(&self, pixel_values: &Tensor4D) -> Result<Tensor3D, OCRError> {
        let model_name = self.inference.model_name();
        let input_shape = pixel_values.shape().to_vec();
        let output_name = &self.inference.output_names()[0];

        let input_tensor = TensorRef::from_array_view(pixel_values.view()).map_err(|e| {
            OCRError::model_inference_error(
                model_name,
                "tensor_conversion",
                0,
                &input_shape,
                &format!("Failed to convert input tensor with shape {:?}", input_shape),
                e,
            )
        })?;

        self.inference.with_session(|session| {
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| {
                    OCRError::model_inference_error(
                        model_name,
                        "forward_pass",
                        0,
                        &input_shape,
                        &format!(
                            "ONNX Runtime inference failed with input '{}' -> output '{}'",
                            self.input_name, output_name
                        ),
                        e,
                    )
                })?;

            let (output_shape, output_data) = outputs[output_name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    OCRError::model_inference_error(
                        model_name,
                        "output_extraction",
                        0,
                        &input_shape,
                        &format!("Failed to extract output tensor '{}' as f32", output_name),
                        e,
                    )
                })?;

            let dims = shape_to_usize(output_shape).unwrap_or_default();
            if dims.len() != 3 {
                return Err(OCRError::tensor_operation_error(
                    "output_validation",
                    &[1, 0, 0],
                    &dims,
                    &format!(
                        "Model '{}': expected 3D hidden states, got shape {:?}",
                        model_name, output_shape
                    ),
                    SimpleError::new("Invalid output tensor dimensions"),
                ));
            }

            let view = ArrayView3::from_shape((dims[0], dims[1], dims[2]), output_data)
                .map_err(OCRError::Tensor)?;
            tracing::trace!("encoder output shape {:?}", view.shape());
            Ok(view.to_owned())
        })
    }
}
