//! Request-level orchestration: decoding, the end-to-end pipeline and the
//! reloadable handle shared by servers.

pub mod cancel;
pub mod decoding;
pub mod handle;
pub mod mixtex;

pub use cancel::CancellationSignal;
pub use decoding::{
    DecodeOptions, DecodeOutcome, DecoderState, StopReason, StoppingDecision,
    argmax_last_position, greedy_decode, stopping_decision,
};
pub use handle::ModelHandle;
pub use mixtex::{InferenceResult, MixTexPipeline, MixTexPipelineBuilder, Recognition};
