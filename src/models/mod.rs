//! Model implementations backed by ONNX Runtime.

pub mod mixtex;

pub use mixtex::{LatexTokenizer, MixTexModel, ModelFiles, OrtDecoder, OrtEncoder};
