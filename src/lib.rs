//! # MixTeX OCR
//!
//! Recognizes mathematical notation in images and returns LaTeX, running a
//! vision encoder and an autoregressive text decoder through ONNX Runtime.
//!
//! ## Pipeline
//!
//! 1. **Canvas normalization**: the bitmap is centred on a 448×448 white canvas,
//!    shrunk with Lanczos3 only when it does not already fit
//! 2. **Feature extraction**: the canvas becomes a `(1, 3, 448, 448)` tensor
//! 3. **Encoding**: one forward pass of the vision encoder
//! 4. **Decoding**: greedy token-by-token generation with an explicit
//!    key/value cache, stopping on end-of-sequence, degenerate repetition or
//!    the step limit
//! 5. **Post-processing**: display math and percent signs are rewritten into
//!    valid LaTeX, optionally splitting aligned rows or using `$` delimiters
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, sessions, the KV cache and model traits
//! * [`models`] - ONNX Runtime encoder/decoder and the tokenizer adapter
//! * [`pipeline`] - Decode loop, end-to-end pipeline and the reloadable handle
//! * [`processors`] - Canvas, tensor, repetition and LaTeX processing
//! * [`utils`] - Image loading and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mixtex_ocr::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MixTexConfig::default().with_model_dir("model");
//! let pipeline = MixTexPipeline::load(&config)?;
//!
//! let image = load_image(Path::new("formula.png"))?;
//! match pipeline.run_ocr(&image, false, false) {
//!     InferenceResult::Success(latex) => println!("{latex}"),
//!     InferenceResult::Failure(message) => eprintln!("{message}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::config::{DecoderConfig, FeatureExtractorConfig, ImageSize, MixTexConfig};
    pub use crate::core::{OCRError, OcrResult};
    pub use crate::models::{MixTexModel, ModelFiles};
    pub use crate::pipeline::{
        CancellationSignal, InferenceResult, MixTexPipeline, ModelHandle, Recognition, StopReason,
    };
    pub use crate::processors::PostprocessOptions;
    pub use crate::utils::{decode_base64_image, decode_image_bytes, load_image};
}
