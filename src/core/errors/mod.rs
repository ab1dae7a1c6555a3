//! Error types for the image-to-LaTeX pipeline.
//!
//! # Usage
//!
//! ```rust
//! use mixtex_ocr::core::errors::{OCRError, ProcessingStage, SimpleError};
//!
//! // A caller supplied bytes that are not an image
//! let error = OCRError::invalid_image("unsupported image format");
//! assert!(error.is_client_error());
//!
//! // A pipeline stage failed
//! let error = OCRError::processing(
//!     ProcessingStage::FeatureExtraction,
//!     "canvas has the wrong size",
//!     SimpleError::new("expected 448x448"),
//! );
//! assert!(error.to_string().contains("feature extraction"));
//! ```

pub mod constructors;
pub mod types;

pub use constructors::ModelInferenceErrorBuilder;
pub use types::{OCRError, ProcessingStage, SimpleError};

/// Convenient result alias for OCR operations.
pub type OcrResult<T> = Result<T, OCRError>;
