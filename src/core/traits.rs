//! Model provider interfaces.
//!
//! The pipeline only talks to the networks and the tokenizer through these
//! traits. The ONNX Runtime implementations live in [`crate::models`]; tests
//! substitute deterministic in-memory ones.

use crate::core::errors::OCRError;
use crate::core::kv_cache::{CacheLayout, KvCache};
use crate::core::{Tensor3D, Tensor4D};

/// A vision encoder mapping pixel values to hidden states.
pub trait VisionEncoder: Send + Sync {
    /// Runs one forward pass over a `(1, 3, H, W)` tensor and returns the
    /// `(1, seq_len, hidden)` hidden states.
    fn encode(&self, pixel_values: &Tensor4D) -> Result<Tensor3D, OCRError>;
}

/// Inputs of one decoder invocation.
#[derive(Debug, Clone, Copy)]
pub struct DecoderStepInput<'a> {
    /// Zero-based decode step, for diagnostics.
    pub step: usize,
    /// The token to extend the sequence with.
    pub input_token: u32,
    /// Encoder output, identical for every step of a request.
    pub encoder_hidden_states: &'a Tensor3D,
    /// Cache from the previous step, empty at step 0.
    pub past: &'a KvCache,
}

/// Outputs of one decoder invocation.
#[derive(Debug, Clone)]
pub struct DecoderStepOutput {
    /// `(1, positions, vocab)` scores; only the last position is used.
    pub logits: Tensor3D,
    /// Cache extended by the positions consumed in this step.
    pub present: KvCache,
}

/// An autoregressive text decoder with an explicit key/value cache.
pub trait TextDecoder: Send + Sync {
    /// Shape of the cache this decoder reads and writes.
    fn cache_layout(&self) -> CacheLayout;

    /// Runs one step.
    fn decode_step(&self, input: DecoderStepInput<'_>) -> Result<DecoderStepOutput, OCRError>;
}

/// Token-level access to the tokenizer.
pub trait TokenDecoder: Send + Sync {
    /// Id of the token that starts every sequence.
    fn start_token_id(&self) -> u32;

    /// Id of the end-of-sequence token.
    fn eos_token_id(&self) -> u32;

    /// Decodes one token with special tokens removed.
    fn decode_token(&self, id: u32) -> Result<String, OCRError>;
}
