//! Tokenizer adapter.

use crate::core::config::DecoderConfig;
use crate::core::config::errors::read_json;
use crate::core::errors::{ProcessingStage, SimpleError};
use crate::core::{OCRError, TokenDecoder};
use serde::Deserialize;
use std::path::Path;
use tokenizers::Tokenizer;

/// The keys of `tokenizer_config.json` that affect decoding.
#[derive(Debug, Deserialize)]
struct HfTokenizerConfig {
    #[serde(default)]
    clean_up_tokenization_spaces: bool,
}

/// Reads `clean_up_tokenization_spaces` from a `tokenizer_config.json`.
///
/// An absent key reads as `false`.
pub fn read_clean_up_flag(path: impl AsRef<Path>) -> Result<bool, OCRError> {
    let config: HfTokenizerConfig = read_json(path.as_ref())?;
    Ok(config.clean_up_tokenization_spaces)
}

/// Removes the space the byte-level decoder leaves before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

/// A `tokenizer.json` tokenizer with the start and end tokens resolved.
#[derive(Debug)]
pub struct LatexTokenizer {
    tokenizer: Tokenizer,
    start_token_id: u32,
    eos_token_id: u32,
    clean_up_spaces: bool,
}

impl LatexTokenizer {
    /// Loads `tokenizer.json` and resolves the configured special tokens.
    pub fn from_file(path: impl AsRef<Path>, config: &DecoderConfig) -> Result<Self, OCRError> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|err| {
            OCRError::model_load_error(
                path,
                format!("failed to load tokenizer: {err}"),
                Some("check that tokenizer.json was exported with the model"),
                None::<OCRError>,
            )
        })?;
        Self::new(tokenizer, config)
    }

    /// Wraps an already constructed tokenizer.
    pub fn new(tokenizer: Tokenizer, config: &DecoderConfig) -> Result<Self, OCRError> {
        let resolve = |token: &str| {
            tokenizer.token_to_id(token).ok_or_else(|| {
                OCRError::config_error(format!("token '{token}' is not in the tokenizer vocabulary"))
            })
        };
        let start_token_id = resolve(&config.bos_token)?;
        let eos_token_id = resolve(&config.eos_token)?;
        tracing::debug!(
            "tokenizer vocab size {}, start {} ({}), eos {} ({})",
            tokenizer.get_vocab_size(true),
            config.bos_token,
            start_token_id,
            config.eos_token,
            eos_token_id
        );
        Ok(Self {
            tokenizer,
            start_token_id,
            eos_token_id,
            clean_up_spaces: false,
        })
    }

    /// Applies [`clean_up_tokenization`] to every decoded token when set.
    pub fn with_clean_up_spaces(mut self, enabled: bool) -> Self {
        self.clean_up_spaces = enabled;
        self
    }
}

impl TokenDecoder for LatexTokenizer {
    fn start_token_id(&self) -> u32 {
        self.start_token_id
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn decode_token(&self, id: u32) -> Result<String, OCRError> {
        let piece = self.tokenizer.decode(&[id], true).map_err(|err| {
            OCRError::processing(
                ProcessingStage::Decoding,
                format!("failed to decode token id {id}"),
                SimpleError::new(err.to_string()),
            )
        })?;
        if self.clean_up_spaces {
            Ok(clean_up_tokenization(&piece))
        } else {
            Ok(piece)
        }
    }
}
