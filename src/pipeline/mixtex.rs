//! The image-to-LaTeX pipeline.

use super::cancel::CancellationSignal;
use super::decoding::{DecodeOptions, StopReason, greedy_decode};
use crate::core::config::{ConfigValidator, DecoderConfig, FeatureExtractorConfig, ImageSize, MixTexConfig};
use crate::core::{OCRError, TextDecoder, TokenDecoder, VisionEncoder};
use crate::models::{MixTexModel, ModelFiles};
use crate::processors::{CanvasNormalizer, FeatureExtractor, PostprocessOptions, postprocess_latex};
use image::RgbImage;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Outcome of a request as reported to callers that only need text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceResult {
    /// Post-processed LaTeX.
    Success(String),
    /// Human-readable description of what went wrong.
    Failure(String),
}

impl InferenceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InferenceResult::Success(_))
    }
}

impl From<Result<Recognition, OCRError>> for InferenceResult {
    fn from(result: Result<Recognition, OCRError>) -> Self {
        match result {
            Ok(recognition) => InferenceResult::Success(recognition.latex),
            Err(err) => InferenceResult::Failure(err.to_string()),
        }
    }
}

/// Detailed result of one recognized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    /// Post-processed LaTeX.
    pub latex: String,
    /// Decoder text before post-processing.
    pub raw_text: String,
    pub stop_reason: StopReason,
    /// Number of decoder invocations.
    pub steps: usize,
    pub elapsed: Duration,
}

/// Normalizer, feature extractor, encoder, decoder and tokenizer wired together.
///
/// A pipeline is immutable after construction and can serve concurrent
/// requests; each request owns its decoding state.
pub struct MixTexPipeline {
    normalizer: CanvasNormalizer,
    extractor: FeatureExtractor,
    encoder: Box<dyn VisionEncoder>,
    decoder: Box<dyn TextDecoder>,
    tokenizer: Box<dyn TokenDecoder>,
    decode: DecodeOptions,
    model_dir: Option<PathBuf>,
}

impl std::fmt::Debug for MixTexPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixTexPipeline")
            .field("canvas", &self.normalizer.target())
            .field("feature_extractor", self.extractor.config())
            .field("cache_layout", &self.decoder.cache_layout())
            .field("decode", &self.decode)
            .field("model_dir", &self.model_dir)
            .finish()
    }
}

impl MixTexPipeline {
    pub fn builder() -> MixTexPipelineBuilder {
        MixTexPipelineBuilder::new()
    }

    /// Discovers and loads the model described by `config`.
    pub fn load(config: &MixTexConfig) -> Result<Self, OCRError> {
        config.validate()?;
        let files = ModelFiles::discover(config.search_paths().as_slice())?;
        let model = MixTexModel::load(files, config)?;
        let decode = DecodeOptions::from(&model.decoder_config);

        MixTexPipelineBuilder::new()
            .canvas_size(config.canvas_size)
            .feature_extractor(model.feature_extractor)
            .decode_options(decode)
            .model_dir(model.files.dir)
            .encoder(model.encoder)
            .decoder(model.decoder)
            .tokenizer(model.tokenizer)
            .build()
    }

    pub fn model_dir(&self) -> Option<&std::path::Path> {
        self.model_dir.as_deref()
    }

    pub fn decode_options(&self) -> DecodeOptions {
        self.decode
    }

    /// Recognizes one image.
    ///
    /// # Errors
    ///
    /// Engine and tokenizer failures, and `OCRError::Cancelled` when `cancel`
    /// fires between decode steps. Reaching the step limit is not an error.
    pub fn recognize(
        &self,
        image: &RgbImage,
        options: &PostprocessOptions,
        cancel: &CancellationSignal,
    ) -> Result<Recognition, OCRError> {
        let started = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OCRError::invalid_image(format!(
                "image has zero size ({width}x{height})"
            )));
        }

        let canvas = self.normalizer.normalize(image);
        let pixel_values = self.extractor.extract(&canvas)?;
        tracing::debug!("pixel values shape {:?}", pixel_values.shape());

        let hidden_states = self.encoder.encode(&pixel_values)?;
        tracing::debug!("encoder output shape {:?}", hidden_states.shape());

        let outcome = greedy_decode(
            self.decoder.as_ref(),
            self.tokenizer.as_ref(),
            &hidden_states,
            &self.decode,
            cancel,
        )?;

        let latex = postprocess_latex(&outcome.text, options);
        let elapsed = started.elapsed();
        tracing::debug!(
            "recognized {}x{} image in {:?}: {} steps, stopped on {}",
            width,
            height,
            elapsed,
            outcome.steps,
            outcome.stop_reason
        );

        Ok(Recognition {
            latex,
            raw_text: outcome.text,
            stop_reason: outcome.stop_reason,
            steps: outcome.steps,
            elapsed,
        })
    }

    /// Recognizes one image and reports the outcome as an [`InferenceResult`].
    pub fn run_ocr(&self, image: &RgbImage, use_dollars: bool, convert_align: bool) -> InferenceResult {
        let options = PostprocessOptions::new(use_dollars, convert_align);
        self.recognize(image, &options, &CancellationSignal::new()).into()
    }
}

/// Builder for [`MixTexPipeline`].
///
/// Encoder, decoder and tokenizer are required; everything else has defaults.
#[derive(Default)]
pub struct MixTexPipelineBuilder {
    canvas_size: Option<ImageSize>,
    feature_extractor: Option<FeatureExtractorConfig>,
    decode: Option<DecodeOptions>,
    model_dir: Option<PathBuf>,
    encoder: Option<Box<dyn VisionEncoder>>,
    decoder: Option<Box<dyn TextDecoder>>,
    tokenizer: Option<Box<dyn TokenDecoder>>,
}

impl MixTexPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas_size(mut self, size: ImageSize) -> Self {
        self.canvas_size = Some(size);
        self
    }

    pub fn feature_extractor(mut self, config: FeatureExtractorConfig) -> Self {
        self.feature_extractor = Some(config);
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode = Some(options);
        self
    }

    /// Takes the step limit and repetition threshold from a decoder config.
    pub fn decoder_config(self, config: &DecoderConfig) -> Self {
        self.decode_options(DecodeOptions::from(config))
    }

    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    pub fn encoder(mut self, encoder: impl VisionEncoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    pub fn decoder(mut self, decoder: impl TextDecoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    pub fn tokenizer(mut self, tokenizer: impl TokenDecoder + 'static) -> Self {
        self.tokenizer = Some(Box::new(tokenizer));
        self
    }

    pub fn build(self) -> Result<MixTexPipeline, OCRError> {
        let canvas = self.canvas_size.unwrap_or_default();
        let feature_extractor = self.feature_extractor.unwrap_or(FeatureExtractorConfig {
            size: canvas,
            ..Default::default()
        });
        let missing = |what: &str| OCRError::config_error(format!("pipeline requires a {what}"));

        Ok(MixTexPipeline {
            normalizer: CanvasNormalizer::new(canvas),
            extractor: FeatureExtractor::new(feature_extractor)?,
            encoder: self.encoder.ok_or_else(|| missing("vision encoder"))?,
            decoder: self.decoder.ok_or_else(|| missing("text decoder"))?,
            tokenizer: self.tokenizer.ok_or_else(|| missing("tokenizer"))?,
            decode: self.decode.unwrap_or_default(),
            model_dir: self.model_dir,
        })
    }
}
