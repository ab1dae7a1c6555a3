//! Canvas to encoder tensor conversion.
//!
//! Produces the `(1, 3, H, W)` CHW tensor the vision encoder consumes:
//! values are rescaled from `u8` and then normalized per channel as
//! `(x * rescale - mean) / std`, folded into one multiply-add per value.

use crate::core::config::{ConfigValidator, FeatureExtractorConfig};
use crate::core::{OCRError, Tensor4D};
use image::{RgbImage, imageops};
use ndarray::Array4;
use rayon::prelude::*;

/// Converts canvases into encoder input tensors.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureExtractorConfig,
    /// Per-channel multiplier (rescale / std)
    alpha: [f32; 3],
    /// Per-channel offset (-mean / std)
    beta: [f32; 3],
}

impl FeatureExtractor {
    /// Creates a new extractor from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `OCRError::ConfigError` if the configuration fails validation.
    pub fn new(config: FeatureExtractorConfig) -> Result<Self, OCRError> {
        config.validate()?;

        let scale = if config.do_rescale {
            config.rescale_factor
        } else {
            1.0
        };
        let mut alpha = [scale; 3];
        let mut beta = [0.0; 3];
        if config.do_normalize {
            for c in 0..3 {
                alpha[c] = scale / config.image_std[c];
                beta[c] = -config.image_mean[c] / config.image_std[c];
            }
        }

        Ok(Self {
            config,
            alpha,
            beta,
        })
    }

    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Shape of the tensor produced by [`FeatureExtractor::extract`].
    pub fn output_shape(&self) -> [usize; 4] {
        [
            1,
            3,
            self.config.size.height as usize,
            self.config.size.width as usize,
        ]
    }

    /// Converts a canvas into a `(1, 3, H, W)` tensor in RGB channel order.
    ///
    /// A canvas that does not match the configured size is resampled with a
    /// bilinear filter when `do_resize` is set and rejected otherwise.
    pub fn extract(&self, canvas: &RgbImage) -> Result<Tensor4D, OCRError> {
        let size = self.config.size;
        let resized;
        let img = if canvas.dimensions() == (size.width, size.height) {
            canvas
        } else if self.config.do_resize {
            resized = imageops::resize(
                canvas,
                size.width,
                size.height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            let (w, h) = canvas.dimensions();
            return Err(OCRError::tensor_operation_error(
                "feature_extraction",
                &[size.height as usize, size.width as usize],
                &[h as usize, w as usize],
                "canvas does not match the feature extractor size and do_resize is disabled",
                crate::core::errors::SimpleError::new("canvas size mismatch"),
            ));
        };

        let (width, height) = img.dimensions();
        let plane = (width * height) as usize;
        let raw = img.as_raw();
        let mut data = vec![0.0f32; 3 * plane];

        data.par_chunks_mut(plane)
            .enumerate()
            .for_each(|(c, channel)| {
                let (alpha, beta) = (self.alpha[c], self.beta[c]);
                for (i, value) in channel.iter_mut().enumerate() {
                    *value = raw[i * 3 + c] as f32 * alpha + beta;
                }
            });

        Array4::from_shape_vec((1, 3, height as usize, width as usize), data)
            .map_err(OCRError::Tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ImageSize;
    use image::Rgb;

    #[test]
    fn test_output_shape_and_values() {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig::default()).unwrap();
        let mut canvas = RgbImage::from_pixel(448, 448, Rgb([255, 255, 255]));
        canvas.put_pixel(3, 2, Rgb([0, 255, 51]));

        let tensor = extractor.extract(&canvas).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 448, 448]);
        assert_eq!(extractor.output_shape(), [1, 3, 448, 448]);

        // white -> (1.0 - 0.5) / 0.5 = 1.0
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        // R = 0 -> -1.0, G = 255 -> 1.0, B = 51 -> (0.2 - 0.5) / 0.5 = -0.6
        assert!((tensor[[0, 0, 2, 3]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 2, 3]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 2, 3]] + 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_without_normalization_only_rescales() {
        let config = FeatureExtractorConfig {
            do_normalize: false,
            size: ImageSize::square(4),
            ..Default::default()
        };
        let extractor = FeatureExtractor::new(config).unwrap();
        let canvas = RgbImage::from_pixel(4, 4, Rgb([255, 0, 255]));
        let tensor = extractor.extract(&canvas).unwrap();
        assert!((tensor[[0, 0, 1, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 1, 1]], 0.0);
    }

    #[test]
    fn test_size_mismatch_without_resize_fails() {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig::default()).unwrap();
        let canvas = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        assert!(matches!(
            extractor.extract(&canvas),
            Err(OCRError::TensorOperation { .. })
        ));
    }

    #[test]
    fn test_size_mismatch_with_resize_is_resampled() {
        let config = FeatureExtractorConfig {
            do_resize: true,
            size: ImageSize::square(32),
            ..Default::default()
        };
        let extractor = FeatureExtractor::new(config).unwrap();
        let canvas = RgbImage::from_pixel(64, 48, Rgb([255, 255, 255]));
        let tensor = extractor.extract(&canvas).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = FeatureExtractorConfig {
            image_std: [0.0, 0.5, 0.5],
            ..Default::default()
        };
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(OCRError::ConfigError { .. })
        ));
    }
}
