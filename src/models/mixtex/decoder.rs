//! Merged autoregressive decoder over ONNX Runtime.
//!
//! The merged export contains both the first-step and the cached branch of the
//! decoder. Every call feeds:
//!
//! * `input_ids`: `i64 [1, 1]`
//! * `encoder_hidden_states`: `f32 [1, seq, hidden]`
//! * `use_cache_branch`: `bool [1]`, always `true`; with an empty cache the
//!   graph behaves like the first-step branch
//! * `past_key_values.{layer}.{key|value}`: `f32 [1, heads, len, head_dim]`
//!
//! Outputs are read by position: the logits first, then the present key and
//! value of each layer in layer order.

use crate::core::config::{DecoderConfig, OrtSessionConfig};
use crate::core::errors::{OCRError, SimpleError};
use crate::core::inference::{OrtInfer, shape_to_usize};
use crate::core::{
    CacheLayout, DecoderStepInput, DecoderStepOutput, KvCache, KvKind, Tensor3D, TextDecoder,
};
use ndarray::{Array1, Array2, ArrayView3, ArrayView4};
use ort::session::SessionInputValue;
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::Path;

const INPUT_IDS: &str = "input_ids";
const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";
const USE_CACHE_BRANCH: &str = "use_cache_branch";

/// Graph input and output names, resolved once at load time.
#[derive(Debug, Clone)]
struct DecoderIo {
    /// `past_key_values.{layer}.{key|value}` in slot order.
    past_inputs: Vec<String>,
    has_use_cache_branch: bool,
    logits_output: String,
    /// `present.{layer}.{key|value}` in slot order.
    present_outputs: Vec<String>,
}

impl DecoderIo {
    fn resolve(inference: &OrtInfer, layout: CacheLayout) -> Result<Self, OCRError> {
        let missing = |what: String| {
            OCRError::model_load_error(
                inference.model_path(),
                what,
                Some("export the decoder with past key values (decoder_model_merged.onnx)"),
                None::<OCRError>,
            )
        };

        for name in [INPUT_IDS, ENCODER_HIDDEN_STATES] {
            if !inference.has_input(name) {
                return Err(missing(format!("decoder graph has no '{name}' input")));
            }
        }

        let mut past_inputs = Vec::with_capacity(layout.tensor_count());
        for layer in 0..layout.num_layers {
            for kind in KvKind::ALL {
                let name = format!("past_key_values.{}.{}", layer, kind.as_str());
                if !inference.has_input(&name) {
                    return Err(missing(format!("decoder graph has no '{name}' input")));
                }
                past_inputs.push(name);
            }
        }

        let outputs = inference.output_names();
        if outputs.len() < 1 + layout.tensor_count() {
            return Err(missing(format!(
                "decoder graph has {} outputs, expected logits plus {} cache tensors",
                outputs.len(),
                layout.tensor_count()
            )));
        }

        Ok(Self {
            past_inputs,
            has_use_cache_branch: inference.has_input(USE_CACHE_BRANCH),
            logits_output: outputs[0].clone(),
            present_outputs: outputs[1..=layout.tensor_count()].to_vec(),
        })
    }
}

/// The exported `decoder_model_merged.onnx`.
#[derive(Debug)]
pub struct OrtDecoder {
    inference: OrtInfer,
    layout: CacheLayout,
    io: DecoderIo,
}

impl OrtDecoder {
    /// Loads the decoder graph and checks it against the configured layer count.
    pub fn load(
        model_path: impl AsRef<Path>,
        decoder: &DecoderConfig,
        session: &OrtSessionConfig,
    ) -> Result<Self, OCRError> {
        let inference = OrtInfer::from_config(session, model_path.as_ref())?;
        let layout = CacheLayout::new(decoder.num_layers, decoder.num_heads, decoder.head_dim());
        let io = DecoderIo::resolve(&inference, layout)?;
        tracing::debug!(
            "decoder '{}': {} layers, {} heads, head_dim {}, use_cache_branch: {}",
            inference.model_name(),
            layout.num_layers,
            layout.num_heads,
            layout.head_dim,
            io.has_use_cache_branch
        );
        Ok(Self {
            inference,
            layout,
            io,
        })
    }

    fn inference_error(
        &self,
        step: usize,
        operation: &str,
        context: String,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> OCRError {
        OCRError::model_inference_error(
            self.inference.model_name(),
            operation,
            step,
            &[1, 1],
            &context,
            error,
        )
    }
}

impl TextDecoder for OrtDecoder {
    fn cache_layout(&self) -> CacheLayout {
        self.layout
    }

    fn decode_step(&self, input: DecoderStepInput<'_>) -> Result<DecoderStepOutput, OCRError> {
        let step = input.step;
        if input.past.layout() != self.layout {
            return Err(self.inference_error(
                step,
                "forward_pass",
                format!(
                    "cache layout {:?} does not match decoder layout {:?}",
                    input.past.layout(),
                    self.layout
                ),
                SimpleError::new("cache layout mismatch"),
            ));
        }

        let input_ids = Array2::from_elem((1, 1), i64::from(input.input_token));
        let use_cache = Array1::from_elem(1, true);

        let convert = |name: &str, e: ort::Error| {
            self.inference_error(
                step,
                "tensor_conversion",
                format!("Failed to convert decoder input '{name}'"),
                e,
            )
        };

        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(3 + self.layout.tensor_count());
        inputs.push((
            Cow::Borrowed(INPUT_IDS),
            TensorRef::from_array_view(input_ids.view())
                .map_err(|e| convert(INPUT_IDS, e))?
                .into(),
        ));
        inputs.push((
            Cow::Borrowed(ENCODER_HIDDEN_STATES),
            TensorRef::from_array_view(input.encoder_hidden_states.view())
                .map_err(|e| convert(ENCODER_HIDDEN_STATES, e))?
                .into(),
        ));
        if self.io.has_use_cache_branch {
            inputs.push((
                Cow::Borrowed(USE_CACHE_BRANCH),
                TensorRef::from_array_view(use_cache.view())
                    .map_err(|e| convert(USE_CACHE_BRANCH, e))?
                    .into(),
            ));
        }
        for ((_, _, tensor), name) in input.past.iter().zip(&self.io.past_inputs) {
            inputs.push((
                Cow::Borrowed(name.as_str()),
                TensorRef::from_array_view(tensor.view())
                    .map_err(|e| convert(name, e))?
                    .into(),
            ));
        }

        self.inference.with_session(|session| {
            let outputs = session.run(inputs).map_err(|e| {
                self.inference_error(
                    step,
                    "forward_pass",
                    format!(
                        "ONNX Runtime decoder step failed with {} cached positions",
                        input.past.cached_len()
                    ),
                    e,
                )
            })?;

            let (logits_shape, logits_data) = outputs[self.io.logits_output.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    self.inference_error(
                        step,
                        "output_extraction",
                        format!("Failed to extract '{}' as f32", self.io.logits_output),
                        e,
                    )
                })?;
            let dims = shape_to_usize(logits_shape).unwrap_or_default();
            if dims.len() != 3 {
                return Err(OCRError::tensor_operation_error(
                    "logits_validation",
                    &[1, 1, 0],
                    &dims,
                    &format!("expected 3D logits, got shape {:?}", logits_shape),
                    SimpleError::new("Invalid logits dimensions"),
                ));
            }
            let logits: Tensor3D = ArrayView3::from_shape((dims[0], dims[1], dims[2]), logits_data)
                .map_err(OCRError::Tensor)?
                .to_owned();

            let mut present = Vec::with_capacity(self.layout.tensor_count());
            for name in &self.io.present_outputs {
                let (shape, data) = outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| {
                        self.inference_error(
                            step,
                            "output_extraction",
                            format!("Failed to extract '{name}' as f32"),
                            e,
                        )
                    })?;
                let dims = shape_to_usize(shape).unwrap_or_default();
                if dims.len() != 4 {
                    return Err(OCRError::tensor_operation_error(
                        "present_validation",
                        &[1, self.layout.num_heads, 0, self.layout.head_dim],
                        &dims,
                        &format!("cache output '{name}' is not 4D"),
                        SimpleError::new("Invalid cache dimensions"),
                    ));
                }
                let view = ArrayView4::from_shape((dims[0], dims[1], dims[2], dims[3]), data)
                    .map_err(OCRError::Tensor)?;
                present.push(view.to_owned());
            }

            Ok(DecoderStepOutput {
                logits,
                present: KvCache::from_tensors(self.layout, present)?,
            })
        })
    }
}
