//! Canvas normalization.
//!
//! The encoder only accepts one spatial size, so every bitmap is placed on a
//! white canvas of that size. Small images are pasted as-is; anything that
//! touches or exceeds the canvas on either axis is shrunk with Lanczos3 so
//! its longer relative side fits, keeping the aspect ratio. Nothing is ever
//! cropped or stretched.

use crate::core::config::ImageSize;
use image::{Rgb, RgbImage, imageops};

/// Background fill for padded regions.
pub const CANVAS_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Where and at what size a bitmap lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPlacement {
    /// Width after resampling.
    pub width: u32,
    /// Height after resampling.
    pub height: u32,
    /// Left offset on the canvas.
    pub offset_x: u32,
    /// Top offset on the canvas.
    pub offset_y: u32,
}

impl CanvasPlacement {
    /// Computes the placement of a `width`×`height` bitmap on `target`.
    ///
    /// Dimensions must be positive.
    pub fn compute(width: u32, height: u32, target: ImageSize) -> Self {
        let (tw, th) = (target.width, target.height);
        let (new_w, new_h) = if width < tw && height < th {
            (width, height)
        } else {
            let scale = (tw as f64 / width as f64).min(th as f64 / height as f64);
            let scaled = |dim: u32, bound: u32| -> u32 {
                ((dim as f64 * scale).round() as u32).clamp(1, bound)
            };
            (scaled(width, tw), scaled(height, th))
        };

        Self {
            width: new_w,
            height: new_h,
            offset_x: (tw - new_w) / 2,
            offset_y: (th - new_h) / 2,
        }
    }
}

/// Pads and, when needed, shrinks bitmaps onto a fixed-size white canvas.
#[derive(Debug, Clone, Copy)]
pub struct CanvasNormalizer {
    target: ImageSize,
    filter: imageops::FilterType,
}

impl Default for CanvasNormalizer {
    fn default() -> Self {
        Self::new(ImageSize::default())
    }
}

impl CanvasNormalizer {
    pub fn new(target: ImageSize) -> Self {
        Self {
            target,
            filter: imageops::FilterType::Lanczos3,
        }
    }

    pub fn target(&self) -> ImageSize {
        self.target
    }

    /// Places `img` on a new canvas.
    pub fn normalize(&self, img: &RgbImage) -> RgbImage {
        let (width, height) = img.dimensions();
        let mut canvas = RgbImage::from_pixel(self.target.width, self.target.height, CANVAS_BACKGROUND);
        if width == 0 || height == 0 {
            return canvas;
        }

        let placement = CanvasPlacement::compute(width, height, self.target);
        let offset_x = i64::from(placement.offset_x);
        let offset_y = i64::from(placement.offset_y);

        if placement.width == width && placement.height == height {
            imageops::replace(&mut canvas, img, offset_x, offset_y);
        } else {
            let resized = imageops::resize(img, placement.width, placement.height, self.filter);
            imageops::replace(&mut canvas, &resized, offset_x, offset_y);
        }

        tracing::trace!(
            "canvas placement: {}x{} -> {}x{} at ({}, {})",
            width,
            height,
            placement.width,
            placement.height,
            placement.offset_x,
            placement.offset_y
        );
        canvas
    }
}

/// Pads `img` onto a white canvas of `target` size.
pub fn pad_image(img: &RgbImage, target: ImageSize) -> RgbImage {
    CanvasNormalizer::new(target).normalize(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_small_image_is_centered_without_resampling() {
        let img = filled(100, 50, 0);
        let canvas = pad_image(&img, ImageSize::square(448));

        assert_eq!(canvas.dimensions(), (448, 448));
        // offsets: (448-100)/2 = 174, (448-50)/2 = 199
        assert_eq!(canvas.get_pixel(174, 199), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(273, 248), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(173, 199), &CANVAS_BACKGROUND);
        assert_eq!(canvas.get_pixel(274, 199), &CANVAS_BACKGROUND);
        assert_eq!(canvas.get_pixel(174, 198), &CANVAS_BACKGROUND);
        assert_eq!(canvas.get_pixel(174, 249), &CANVAS_BACKGROUND);
    }

    #[test]
    fn test_exact_size_input_is_identity() {
        let mut img = filled(448, 448, 10);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(447, 447, Rgb([4, 5, 6]));

        let canvas = pad_image(&img, ImageSize::square(448));
        assert_eq!(canvas, img);
    }

    #[test]
    fn test_wide_image_is_shrunk_to_fit() {
        let placement = CanvasPlacement::compute(1000, 200, ImageSize::square(448));
        assert_eq!(placement.width, 448);
        // 200 * 0.448 = 89.6
        assert_eq!(placement.height, 90);
        assert_eq!(placement.offset_x, 0);
        assert_eq!(placement.offset_y, (448 - 90) / 2);

        let canvas = pad_image(&filled(1000, 200, 0), ImageSize::square(448));
        assert_eq!(canvas.dimensions(), (448, 448));
        assert_eq!(canvas.get_pixel(0, 0), &CANVAS_BACKGROUND);
        assert_eq!(canvas.get_pixel(224, 224), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_one_side_at_target_is_not_resampled() {
        let placement = CanvasPlacement::compute(448, 100, ImageSize::square(448));
        assert_eq!((placement.width, placement.height), (448, 100));
        assert_eq!((placement.offset_x, placement.offset_y), (0, 174));
    }

    #[test]
    fn test_tall_image_never_exceeds_canvas() {
        let placement = CanvasPlacement::compute(10, 5000, ImageSize::square(448));
        assert_eq!(placement.height, 448);
        assert_eq!(placement.width, 1);
        assert!(placement.offset_x + placement.width <= 448);
    }

    #[test]
    fn test_output_size_is_always_target() {
        let target = ImageSize::new(448, 448);
        for (w, h) in [(1, 1), (447, 447), (449, 10), (3000, 2999), (640, 480)] {
            let canvas = pad_image(&filled(w, h, 128), target);
            assert_eq!(canvas.dimensions(), (448, 448), "input {w}x{h}");
        }
    }

    #[test]
    fn test_non_square_target() {
        let placement = CanvasPlacement::compute(800, 800, ImageSize::new(400, 200));
        assert_eq!((placement.width, placement.height), (200, 200));
        assert_eq!((placement.offset_x, placement.offset_y), (100, 0));
    }
}
