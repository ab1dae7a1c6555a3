//! MixTeX vision-encoder-decoder model.
//!
//! A Swin-style image encoder and a RoBERTa-style text decoder exported as
//! two ONNX graphs plus a `tokenizer.json`.

mod decoder;
mod encoder;
mod files;
mod tokenizer;

pub use decoder::OrtDecoder;
pub use encoder::{OrtEncoder, PIXEL_VALUES_INPUT};
pub use files::{
    DECODER_FILE, ENCODER_FILE, MODEL_CONFIG_FILE, ModelFiles, PREPROCESSOR_CONFIG_FILE,
    REQUIRED_FILES, TOKENIZER_FILE,
};
pub use tokenizer::{LatexTokenizer, clean_up_tokenization, read_clean_up_flag};

use crate::core::config::{DecoderConfig, FeatureExtractorConfig, MixTexConfig};
use crate::core::OCRError;

/// Everything loaded from a model directory.
#[derive(Debug)]
pub struct MixTexModel {
    pub files: ModelFiles,
    pub encoder: OrtEncoder,
    pub decoder: OrtDecoder,
    pub tokenizer: LatexTokenizer,
    pub feature_extractor: FeatureExtractorConfig,
    pub decoder_config: DecoderConfig,
}

impl MixTexModel {
    /// Loads the graphs, tokenizer and configs in `files`.
    ///
    /// An explicit feature extractor in `config` wins over the exported
    /// `preprocessor_config.json`; the decoder shape is taken from the
    /// exported `config.json` when present.
    pub fn load(files: ModelFiles, config: &MixTexConfig) -> Result<Self, OCRError> {
        tracing::info!("loading model from {}", files.dir.display());

        let feature_extractor = match (&config.feature_extractor, &files.preprocessor_config) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(path)) => FeatureExtractorConfig::from_preprocessor_json(path)?,
            (None, None) => FeatureExtractorConfig {
                size: config.canvas_size,
                ..Default::default()
            },
        };
        tracing::info!(
            "feature extractor: size {}x{}, do_resize {}, do_normalize {}, mean {:?}, std {:?}",
            feature_extractor.size.width,
            feature_extractor.size.height,
            feature_extractor.do_resize,
            feature_extractor.do_normalize,
            feature_extractor.image_mean,
            feature_extractor.image_std
        );

        let decoder_config = match &files.model_config {
            Some(path) => config.decoder.clone().with_model_config(path)?,
            None => config.decoder.clone(),
        };

        let encoder = OrtEncoder::load(&files.encoder, &config.ort_session)?;
        let decoder = OrtDecoder::load(&files.decoder, &decoder_config, &config.ort_session)?;
        let mut tokenizer = LatexTokenizer::from_file(&files.tokenizer, &decoder_config)?;
        if let Some(path) = &files.tokenizer_config {
            tokenizer = tokenizer.with_clean_up_spaces(read_clean_up_flag(path)?);
        }

        tracing::info!("model loaded");
        Ok(Self {
            files,
            encoder,
            decoder,
            tokenizer,
            feature_extractor,
            decoder_config,
        })
    }
}
