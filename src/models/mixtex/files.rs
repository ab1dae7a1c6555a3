//! Model directory discovery.

use crate::core::OCRError;
use std::path::{Path, PathBuf};

pub const ENCODER_FILE: &str = "encoder_model.onnx";
pub const DECODER_FILE: &str = "decoder_model_merged.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// Files that must all be present for a directory to hold a usable model.
pub const REQUIRED_FILES: [&str; 3] = [ENCODER_FILE, DECODER_FILE, TOKENIZER_FILE];

/// Paths of the files making up an exported model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub dir: PathBuf,
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub tokenizer: PathBuf,
    /// `tokenizer_config.json`, if exported.
    pub tokenizer_config: Option<PathBuf>,
    /// `preprocessor_config.json`, if exported.
    pub preprocessor_config: Option<PathBuf>,
    /// `config.json`, if exported.
    pub model_config: Option<PathBuf>,
}

impl ModelFiles {
    /// Collects the model files in `dir`, or `None` if a required file is missing.
    pub fn in_dir(dir: impl AsRef<Path>) -> Option<Self> {
        let dir = dir.as_ref();
        if !REQUIRED_FILES.iter().all(|f| dir.join(f).is_file()) {
            return None;
        }
        let optional = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
        Some(Self {
            dir: dir.to_path_buf(),
            encoder: dir.join(ENCODER_FILE),
            decoder: dir.join(DECODER_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            tokenizer_config: optional(TOKENIZER_CONFIG_FILE),
            preprocessor_config: optional(PREPROCESSOR_CONFIG_FILE),
            model_config: optional(MODEL_CONFIG_FILE),
        })
    }

    /// Returns the first of `search_paths` that holds a complete model.
    ///
    /// # Errors
    ///
    /// `OCRError::ModelUnavailable` listing the probed paths when none is complete.
    pub fn discover<P: AsRef<Path>>(search_paths: &[P]) -> Result<Self, OCRError> {
        for path in search_paths {
            let path = path.as_ref();
            if let Some(files) = Self::in_dir(path) {
                tracing::info!("using model directory {}", path.display());
                return Ok(files);
            }
            tracing::debug!("no complete model in {}", path.display());
        }

        let probed = search_paths
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(OCRError::model_unavailable(format!(
            "no directory among [{}] contains {}",
            probed,
            REQUIRED_FILES.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_model(dir: &Path, files: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for f in files {
            fs::write(dir.join(f), b"stub").unwrap();
        }
    }

    #[test]
    fn test_discovers_first_complete_directory() {
        let root = tempfile::tempdir().unwrap();
        let incomplete = root.path().join("a");
        let complete = root.path().join("b");
        write_model(&incomplete, &[ENCODER_FILE, TOKENIZER_FILE]);
        write_model(
            &complete,
            &[ENCODER_FILE, DECODER_FILE, TOKENIZER_FILE, TOKENIZER_CONFIG_FILE, MODEL_CONFIG_FILE],
        );

        let files = ModelFiles::discover(&[root.path().join("missing"), incomplete, complete.clone()])
            .unwrap();
        assert_eq!(files.dir, complete);
        assert_eq!(files.decoder, complete.join(DECODER_FILE));
        assert_eq!(files.model_config, Some(complete.join(MODEL_CONFIG_FILE)));
        assert_eq!(files.tokenizer_config, Some(complete.join(TOKENIZER_CONFIG_FILE)));
        assert_eq!(files.preprocessor_config, None);
    }

    #[test]
    fn test_no_complete_directory_is_model_unavailable() {
        let root = tempfile::tempdir().unwrap();
        write_model(root.path(), &[DECODER_FILE]);
        let err = ModelFiles::discover(&[root.path()]).unwrap_err();
        assert!(matches!(err, OCRError::ModelUnavailable { .. }));
        assert!(err.to_string().contains(ENCODER_FILE));
    }
}
