//! ONNX Runtime session management.

pub mod ort_infer;
pub mod session;

pub use ort_infer::{OrtInfer, shape_to_usize};
pub use session::{apply_ort_config, load_session};
