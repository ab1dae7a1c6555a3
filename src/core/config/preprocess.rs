//! Feature extractor configuration.
//!
//! The encoder expects a fixed tensor layout; every knob that affects the
//! numbers fed to it lives in [`FeatureExtractorConfig`], which carries an
//! explicit schema version so configs persisted next to a model can be checked
//! before use.

use super::errors::{ConfigError, ConfigValidator, read_json};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current schema version of [`FeatureExtractorConfig`].
pub const FEATURE_EXTRACTOR_CONFIG_VERSION: u32 = 1;

/// Default model canvas side length in pixels.
pub const DEFAULT_CANVAS_SIZE: u32 = 448;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::square(DEFAULT_CANVAS_SIZE)
    }
}

/// Pixel-to-tensor conversion parameters for the vision encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    /// Schema version; must equal [`FEATURE_EXTRACTOR_CONFIG_VERSION`].
    pub version: u32,
    /// Spatial size of the produced tensor.
    pub size: ImageSize,
    /// Resample the canvas to `size` when it differs. The canvas normalizer
    /// already produces `size`, so this is normally a no-op.
    pub do_resize: bool,
    /// Multiply raw `u8` values by `rescale_factor`.
    pub do_rescale: bool,
    pub rescale_factor: f32,
    /// Apply `(x - mean) / std` per channel after rescaling.
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            version: FEATURE_EXTRACTOR_CONFIG_VERSION,
            size: ImageSize::default(),
            do_resize: false,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: [0.5, 0.5, 0.5],
            image_std: [0.5, 0.5, 0.5],
        }
    }
}

/// `size` in Hugging Face processor configs is either an integer or a map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HfSize {
    Square(u32),
    HeightWidth { height: u32, width: u32 },
    ShortestEdge { shortest_edge: u32 },
}

/// Subset of a Hugging Face `preprocessor_config.json` (ViT image processor).
#[derive(Debug, Deserialize)]
struct HfPreprocessorConfig {
    do_resize: Option<bool>,
    do_rescale: Option<bool>,
    rescale_factor: Option<f32>,
    do_normalize: Option<bool>,
    image_mean: Option<[f32; 3]>,
    image_std: Option<[f32; 3]>,
    size: Option<HfSize>,
}

impl FeatureExtractorConfig {
    /// Reads a Hugging Face `preprocessor_config.json`, filling absent keys
    /// with the defaults above.
    ///
    /// `do_resize` is only honoured when the file's size differs from the
    /// canvas; the extractor never resamples a canvas that already matches.
    pub fn from_preprocessor_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let hf: HfPreprocessorConfig = read_json(path.as_ref())?;
        let defaults = Self::default();
        let size = match hf.size {
            Some(HfSize::Square(side)) => ImageSize::square(side),
            Some(HfSize::HeightWidth { height, width }) => ImageSize::new(width, height),
            Some(HfSize::ShortestEdge { shortest_edge }) => ImageSize::square(shortest_edge),
            None => defaults.size,
        };
        let config = Self {
            version: FEATURE_EXTRACTOR_CONFIG_VERSION,
            size,
            do_resize: hf.do_resize.unwrap_or(defaults.do_resize),
            do_rescale: hf.do_rescale.unwrap_or(defaults.do_rescale),
            rescale_factor: hf.rescale_factor.unwrap_or(defaults.rescale_factor),
            do_normalize: hf.do_normalize.unwrap_or(defaults.do_normalize),
            image_mean: hf.image_mean.unwrap_or(defaults.image_mean),
            image_std: hf.image_std.unwrap_or(defaults.image_std),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for FeatureExtractorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != FEATURE_EXTRACTOR_CONFIG_VERSION {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "unsupported feature extractor config version {} (expected {})",
                    self.version, FEATURE_EXTRACTOR_CONFIG_VERSION
                ),
            });
        }
        self.validate_positive("size.width", self.size.width as usize)?;
        self.validate_positive("size.height", self.size.height as usize)?;
        if self.do_rescale && !(self.rescale_factor.is_finite() && self.rescale_factor > 0.0) {
            return Err(ConfigError::InvalidConfig {
                message: format!("rescale_factor must be positive, got {}", self.rescale_factor),
            });
        }
        if self.do_normalize {
            for (i, &s) in self.image_std.iter().enumerate() {
                if !(s.is_finite() && s > 0.0) {
                    return Err(ConfigError::InvalidConfig {
                        message: format!("image_std[{i}] must be positive, got {s}"),
                    });
                }
            }
            if self.image_mean.iter().any(|m| !m.is_finite()) {
                return Err(ConfigError::InvalidConfig {
                    message: "image_mean must be finite".to_string(),
                });
            }
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_vit_processor() {
        let cfg = FeatureExtractorConfig::default();
        assert_eq!(cfg.size, ImageSize::square(448));
        assert!(!cfg.do_resize);
        assert!(cfg.do_normalize);
        assert_eq!(cfg.image_mean, [0.5; 3]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_reads_preprocessor_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "do_normalize": true,
                "do_rescale": true,
                "do_resize": true,
                "image_mean": [0.485, 0.456, 0.406],
                "image_processor_type": "ViTImageProcessor",
                "image_std": [0.229, 0.224, 0.225],
                "resample": 2,
                "rescale_factor": 0.00392156862745098,
                "size": {{"height": 448, "width": 448}}
            }}"#
        )
        .unwrap();

        let cfg = FeatureExtractorConfig::from_preprocessor_json(file.path()).unwrap();
        assert_eq!(cfg.size, ImageSize::square(448));
        assert!(cfg.do_resize);
        assert!((cfg.image_std[0] - 0.229).abs() < 1e-6);
    }

    #[test]
    fn test_reads_integer_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"size": 384}}"#).unwrap();
        let cfg = FeatureExtractorConfig::from_preprocessor_json(file.path()).unwrap();
        assert_eq!(cfg.size, ImageSize::square(384));
        assert_eq!(cfg.image_mean, [0.5; 3]);
    }

    #[test]
    fn test_rejects_zero_std_and_wrong_version() {
        let cfg = FeatureExtractorConfig {
            image_std: [0.5, 0.0, 0.5],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FeatureExtractorConfig {
            version: 99,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
