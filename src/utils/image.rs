//! Bitmap decoding from files, raw bytes and base64 payloads.

use crate::core::OCRError;
use base64::Engine;
use image::{DynamicImage, RgbImage};

/// Converts a DynamicImage to an RgbImage.
///
/// Alpha is dropped and grayscale is expanded to three channels.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from a file path and converts it to RgbImage.
///
/// # Errors
///
/// Returns `OCRError::ImageLoad` if the file cannot be read or decoded.
pub fn load_image(path: &std::path::Path) -> Result<RgbImage, OCRError> {
    let img = image::open(path).map_err(OCRError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}

/// Decodes encoded image bytes (PNG, JPEG, ...) into an RgbImage.
///
/// # Errors
///
/// Returns `OCRError::InvalidImage` for empty input or undecodable bytes.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage, OCRError> {
    if bytes.is_empty() {
        return Err(OCRError::invalid_image("image data is empty"));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|err| OCRError::invalid_image_with_source("failed to decode image", err))?;
    Ok(dynamic_to_rgb(img))
}

/// Returns the base64 payload of `data`, dropping a leading
/// `data:image/...;base64,` prefix when present.
pub fn strip_data_url_prefix(data: &str) -> &str {
    let data = data.trim();
    if data.starts_with("data:image") {
        data.split_once(',').map(|(_, payload)| payload).unwrap_or("")
    } else {
        data
    }
}

/// Decodes a base64 string, optionally wrapped in an image data URL, into an
/// RgbImage.
///
/// # Errors
///
/// Returns `OCRError::InvalidImage` if the payload is not valid base64 or the
/// decoded bytes are not an image.
pub fn decode_base64_image(data: &str) -> Result<RgbImage, OCRError> {
    let payload = strip_data_url_prefix(data);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| OCRError::invalid_image_with_source("invalid base64 image payload", err))?;
    decode_image_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_image_bytes() {
        let img = decode_image_bytes(&png_bytes()).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_garbage_bytes_are_invalid_image() {
        assert!(matches!(
            decode_image_bytes(b"not an image"),
            Err(OCRError::InvalidImage { .. })
        ));
        assert!(matches!(decode_image_bytes(&[]), Err(OCRError::InvalidImage { .. })));
    }

    #[test]
    fn test_strip_data_url_prefix() {
        assert_eq!(strip_data_url_prefix("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url_prefix("  QUJD\n"), "QUJD");
        assert_eq!(strip_data_url_prefix("data:text/plain;base64,QUJD"), "data:text/plain;base64,QUJD");
    }

    #[test]
    fn test_decode_base64_with_and_without_prefix() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());
        let plain = decode_base64_image(&encoded).unwrap();
        let prefixed = decode_base64_image(&format!("data:image/png;base64,{encoded}")).unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn test_invalid_base64_is_invalid_image() {
        let err = decode_base64_image("data:image/png;base64,@@@").unwrap_err();
        assert!(err.is_client_error());
        assert!(decode_base64_image("").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_image(&dir.path().join("missing.png")),
            Err(OCRError::ImageLoad(_))
        ));
    }
}
