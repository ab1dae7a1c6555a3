//! Image and text processing stages around the models.
//!
//! * [`canvas`] places a bitmap on the fixed-size model canvas
//! * [`normalization`] turns the canvas into the encoder tensor
//! * [`repetition`] detects looping decoder output
//! * [`latex`] rewrites decoder text into LaTeX

pub mod canvas;
pub mod latex;
pub mod normalization;
pub mod repetition;

pub use canvas::{CANVAS_BACKGROUND, CanvasNormalizer, CanvasPlacement, pad_image};
pub use latex::{PostprocessOptions, convert_align_to_equations, postprocess_latex};
pub use normalization::FeatureExtractor;
pub use repetition::has_repetition;
