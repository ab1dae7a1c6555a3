//! Decoder and pipeline configuration.

use super::errors::{ConfigError, ConfigValidator, read_json};
use super::onnx::OrtSessionConfig;
use super::preprocess::{FeatureExtractorConfig, ImageSize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of consecutive copies of a pattern that ends decoding.
pub const DEFAULT_REPETITION_THRESHOLD: usize = 21;

/// Upper bound on decoder invocations per request.
pub const DEFAULT_MAX_STEPS: usize = 512;

/// Shape and stopping parameters of the autoregressive decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Number of transformer layers, each owning a key and a value cache.
    pub num_layers: usize,
    /// Attention heads per layer.
    pub num_heads: usize,
    /// Model hidden size; `hidden_size / num_heads` is the per-head dimension.
    pub hidden_size: usize,
    /// Maximum number of decode steps. Zero yields empty text.
    pub max_steps: usize,
    /// Stop once any pattern appears this many times in a row.
    pub repetition_threshold: usize,
    /// Token fed to the decoder at step 0.
    pub bos_token: String,
    /// Token that ends generation.
    pub eos_token: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            num_layers: 6,
            num_heads: 12,
            hidden_size: 768,
            max_steps: DEFAULT_MAX_STEPS,
            repetition_threshold: DEFAULT_REPETITION_THRESHOLD,
            bos_token: "<s>".to_string(),
            eos_token: "</s>".to_string(),
        }
    }
}

/// The `decoder` section of a Hugging Face vision-encoder-decoder `config.json`.
///
/// GPT-2, BERT-style and TrOCR decoders spell the same fields differently, and
/// some configs carry more than one spelling.
#[derive(Debug, Deserialize)]
struct HfDecoderSection {
    num_hidden_layers: Option<usize>,
    decoder_layers: Option<usize>,
    n_layer: Option<usize>,
    num_attention_heads: Option<usize>,
    decoder_attention_heads: Option<usize>,
    n_head: Option<usize>,
    hidden_size: Option<usize>,
    d_model: Option<usize>,
    n_embd: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HfModelConfig {
    decoder: Option<HfDecoderSection>,
}

impl DecoderConfig {
    /// Per-head dimension of every cache tensor.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_heads.max(1)
    }

    /// Overrides the decoder shape with the values found in a model's
    /// `config.json`. Keys that are absent keep their current value.
    pub fn with_model_config(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let hf: HfModelConfig = read_json(path.as_ref())?;
        if let Some(decoder) = hf.decoder {
            if let Some(layers) = decoder
                .num_hidden_layers
                .or(decoder.decoder_layers)
                .or(decoder.n_layer)
            {
                self.num_layers = layers;
            }
            if let Some(heads) = decoder
                .num_attention_heads
                .or(decoder.decoder_attention_heads)
                .or(decoder.n_head)
            {
                self.num_heads = heads;
            }
            if let Some(hidden) = decoder.hidden_size.or(decoder.d_model).or(decoder.n_embd) {
                self.hidden_size = hidden;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_repetition_threshold(mut self, threshold: usize) -> Self {
        self.repetition_threshold = threshold;
        self
    }
}

impl ConfigValidator for DecoderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive("num_layers", self.num_layers)?;
        self.validate_positive("num_heads", self.num_heads)?;
        self.validate_positive("hidden_size", self.hidden_size)?;
        self.validate_positive("repetition_threshold", self.repetition_threshold)?;
        if self.hidden_size % self.num_heads != 0 {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "hidden_size {} is not divisible by num_heads {}",
                    self.hidden_size, self.num_heads
                ),
            });
        }
        if self.bos_token.is_empty() || self.eos_token.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "bos_token and eos_token must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Top-level configuration of the image-to-LaTeX pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixTexConfig {
    /// Explicit model directory. When unset, `model_search_paths` are probed.
    pub model_dir: Option<PathBuf>,
    /// Directories probed in order for a complete model.
    pub model_search_paths: Vec<PathBuf>,
    /// Size of the white canvas the bitmap is padded onto.
    pub canvas_size: ImageSize,
    /// Overrides the model's `preprocessor_config.json`.
    pub feature_extractor: Option<FeatureExtractorConfig>,
    pub decoder: DecoderConfig,
    pub ort_session: OrtSessionConfig,
}

impl Default for MixTexConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            model_search_paths: vec![PathBuf::from("model"), PathBuf::from("../model")],
            canvas_size: ImageSize::default(),
            feature_extractor: None,
            decoder: DecoderConfig::default(),
            ort_session: OrtSessionConfig::default(),
        }
    }
}

impl MixTexConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    /// Directories to probe, the explicit `model_dir` first.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.model_dir
            .iter()
            .chain(self.model_search_paths.iter())
            .cloned()
            .collect()
    }
}

impl ConfigValidator for MixTexConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive("canvas_size.width", self.canvas_size.width as usize)?;
        self.validate_positive("canvas_size.height", self.canvas_size.height as usize)?;
        if let Some(fe) = &self.feature_extractor {
            fe.validate()?;
        }
        self.decoder.validate()?;
        self.ort_session.validate()?;
        if self.model_dir.is_none() && self.model_search_paths.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "either model_dir or model_search_paths must be set".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}
