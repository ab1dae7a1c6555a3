//! Greedy autoregressive decoding.
//!
//! Each step feeds the previous token and the whole cache to the decoder,
//! picks the highest-scoring next token, appends its text, and then applies
//! the stop checks in a fixed order: repetition, end-of-sequence, step limit.
//! The state for a request lives entirely on the stack of [`greedy_decode`].

use super::cancel::CancellationSignal;
use crate::core::config::{DEFAULT_MAX_STEPS, DEFAULT_REPETITION_THRESHOLD, DecoderConfig};
use crate::core::errors::{OCRError, SimpleError};
use crate::core::{DecoderStepInput, KvCache, Tensor3D, TextDecoder, TokenDecoder};
use crate::processors::has_repetition;
use std::fmt;

/// Why decoding ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The end-of-sequence token was produced.
    Eos,
    /// The text started looping on a pattern.
    Repetition,
    /// The step limit was reached. The text is returned as-is.
    MaxLength,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Eos => "end of sequence",
            StopReason::Repetition => "repetition",
            StopReason::MaxLength => "max length",
        })
    }
}

/// Outcome of the stop checks after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingDecision {
    Continue,
    Stop(StopReason),
}

/// Limits applied by the decode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub max_steps: usize,
    pub repetition_threshold: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            repetition_threshold: DEFAULT_REPETITION_THRESHOLD,
        }
    }
}

impl From<&DecoderConfig> for DecodeOptions {
    fn from(config: &DecoderConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            repetition_threshold: config.repetition_threshold,
        }
    }
}

/// Per-request decoding state.
#[derive(Debug, Clone)]
pub struct DecoderState {
    /// Token fed to the next decoder invocation.
    pub current_token: u32,
    /// Cache holding every position consumed so far.
    pub past_key_values: KvCache,
    /// Decoded text of every selected token, special tokens removed.
    pub generated_text: String,
    /// Selected token ids, including a final end-of-sequence token.
    pub token_ids: Vec<u32>,
    /// Number of completed steps that continued decoding.
    pub step_count: usize,
}

impl DecoderState {
    pub fn new(start_token: u32, cache: KvCache) -> Self {
        Self {
            current_token: start_token,
            past_key_values: cache,
            generated_text: String::new(),
            token_ids: Vec::new(),
            step_count: 0,
        }
    }
}

/// Result of a finished decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub text: String,
    pub token_ids: Vec<u32>,
    pub stop_reason: StopReason,
    /// Number of decoder invocations.
    pub steps: usize,
}

/// Applies the stop checks to the state after `next_token` was appended.
///
/// Repetition is checked first because a looping sequence can still end with
/// the end-of-sequence token; both outcomes stop, but the reason differs.
pub fn stopping_decision(
    state: &DecoderState,
    next_token: u32,
    eos_token: u32,
    options: &DecodeOptions,
) -> StoppingDecision {
    if has_repetition(&state.generated_text, options.repetition_threshold) {
        StoppingDecision::Stop(StopReason::Repetition)
    } else if next_token == eos_token {
        StoppingDecision::Stop(StopReason::Eos)
    } else if state.step_count + 1 >= options.max_steps {
        StoppingDecision::Stop(StopReason::MaxLength)
    } else {
        StoppingDecision::Continue
    }
}

/// Index of the largest score at the last position of `(1, positions, vocab)`
/// logits. Ties go to the lowest index and NaN scores are never selected.
pub fn argmax_last_position(logits: &Tensor3D) -> Result<u32, OCRError> {
    let shape = logits.shape();
    if shape[0] == 0 || shape[1] == 0 || shape[2] == 0 {
        return Err(OCRError::tensor_operation_error(
            "argmax",
            &[1, 1, 1],
            shape,
            "logits have an empty dimension",
            SimpleError::new("empty logits"),
        ));
    }

    let last = logits.slice(ndarray::s![0, shape[1] - 1, ..]);
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in last.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }

    let (idx, _) = best.ok_or_else(|| {
        OCRError::tensor_operation_error(
            "argmax",
            &[shape[2]],
            &[0],
            "every logit at the last position is NaN",
            SimpleError::new("no finite logits"),
        )
    })?;
    u32::try_from(idx).map_err(|_| {
        OCRError::tensor_operation_error(
            "argmax",
            &[u32::MAX as usize],
            &[idx],
            "token index does not fit a u32 id",
            SimpleError::new(format!("token index {idx} exceeds u32")),
        )
    })
}

/// Runs the greedy decode loop over `encoder_output`.
///
/// Any decoder or tokenizer error aborts the loop and is returned; no partial
/// text is produced in that case. Reaching `max_steps` is a normal stop.
pub fn greedy_decode(
    decoder: &dyn TextDecoder,
    tokenizer: &dyn TokenDecoder,
    encoder_output: &Tensor3D,
    options: &DecodeOptions,
    cancel: &CancellationSignal,
) -> Result<DecodeOutcome, OCRError> {
    let eos = tokenizer.eos_token_id();
    let mut state = DecoderState::new(
        tokenizer.start_token_id(),
        KvCache::empty(decoder.cache_layout()),
    );

    if options.max_steps == 0 {
        return Ok(DecodeOutcome {
            text: state.generated_text,
            token_ids: state.token_ids,
            stop_reason: StopReason::MaxLength,
            steps: 0,
        });
    }

    loop {
        let step = state.step_count;
        cancel.check(step)?;

        let output = decoder.decode_step(DecoderStepInput {
            step,
            input_token: state.current_token,
            encoder_hidden_states: encoder_output,
            past: &state.past_key_values,
        })?;

        let expected_len = state.past_key_values.cached_len() + 1;
        if output.present.cached_len() != expected_len {
            return Err(OCRError::tensor_operation_error(
                "kv_cache_update",
                &[expected_len],
                &[output.present.cached_len()],
                &format!("decoder step {step} did not extend the cache by one position"),
                SimpleError::new("cache length mismatch"),
            ));
        }

        let next_token = argmax_last_position(&output.logits)?;
        let piece = tokenizer.decode_token(next_token)?;
        state.generated_text.push_str(&piece);
        state.token_ids.push(next_token);

        tracing::trace!("step {}: token {} -> {:?}", step, next_token, piece);

        match stopping_decision(&state, next_token, eos, options) {
            StoppingDecision::Stop(reason) => {
                tracing::debug!("decoding stopped after {} steps: {}", step + 1, reason);
                return Ok(DecodeOutcome {
                    text: state.generated_text,
                    token_ids: state.token_ids,
                    stop_reason: reason,
                    steps: step + 1,
                });
            }
            StoppingDecision::Continue => {
                state.current_token = next_token;
                state.past_key_values = output.present;
                state.step_count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ProcessingStage;
    use crate::core::{CacheLayout, DecoderStepOutput};
    use ndarray::{Array3, Array4};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const VOCAB: usize = 8;
    const EOS: u32 = 2;

    /// Emits a fixed token sequence, one per step, and records the cache
    /// length it was given at each call.
    struct ScriptedDecoder {
        layout: CacheLayout,
        script: Vec<u32>,
        seen_cache_lens: Mutex<Vec<usize>>,
        fail_at: Option<usize>,
        grow_by: usize,
    }

    impl ScriptedDecoder {
        fn new(script: Vec<u32>) -> Self {
            Self {
                layout: CacheLayout::new(2, 2, 4),
                script,
                seen_cache_lens: Mutex::new(Vec::new()),
                fail_at: None,
                grow_by: 1,
            }
        }
    }

    impl TextDecoder for ScriptedDecoder {
        fn cache_layout(&self) -> CacheLayout {
            self.layout
        }

        fn decode_step(&self, input: DecoderStepInput<'_>) -> Result<DecoderStepOutput, OCRError> {
            let len = input.past.cached_len();
            self.seen_cache_lens.lock().unwrap().push(len);
            if self.fail_at == Some(input.step) {
                return Err(OCRError::inference_error(
                    "scripted",
                    "forced failure",
                    SimpleError::new("boom"),
                ));
            }
            let token = self.script[input.step.min(self.script.len() - 1)];
            let mut logits = Array3::zeros((1, 1, VOCAB));
            logits[[0, 0, token as usize]] = 5.0;

            let present = (0..self.layout.tensor_count())
                .map(|_| {
                    Array4::zeros((
                        1,
                        self.layout.num_heads,
                        len + self.grow_by,
                        self.layout.head_dim,
                    ))
                })
                .collect();
            Ok(DecoderStepOutput {
                logits,
                present: KvCache::from_tensors(self.layout, present)?,
            })
        }
    }

    struct MapTokenizer(HashMap<u32, &'static str>);

    impl MapTokenizer {
        fn new() -> Self {
            Self(HashMap::from([
                (0, ""),
                (EOS, ""),
                (3, "x"),
                (4, "+"),
                (5, "1"),
                (6, "ab"),
            ]))
        }
    }

    impl TokenDecoder for MapTokenizer {
        fn start_token_id(&self) -> u32 {
            0
        }

        fn eos_token_id(&self) -> u32 {
            EOS
        }

        fn decode_token(&self, id: u32) -> Result<String, OCRError> {
            self.0
                .get(&id)
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    OCRError::processing(
                        ProcessingStage::Decoding,
                        format!("failed to decode token id {id}"),
                        SimpleError::new("unknown id"),
                    )
                })
        }
    }

    fn encoder_output() -> Tensor3D {
        Array3::zeros((1, 4, 8))
    }

    fn run(decoder: &ScriptedDecoder, options: DecodeOptions) -> Result<DecodeOutcome, OCRError> {
        greedy_decode(
            decoder,
            &MapTokenizer::new(),
            &encoder_output(),
            &options,
            &CancellationSignal::new(),
        )
    }

    #[test]
    fn test_stops_at_eos() {
        let decoder = ScriptedDecoder::new(vec![3, 4, 5, EOS]);
        let outcome = run(&decoder, DecodeOptions::default()).unwrap();
        assert_eq!(outcome.text, "x+1");
        assert_eq!(outcome.stop_reason, StopReason::Eos);
        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.token_ids, vec![3, 4, 5, EOS]);
    }

    #[test]
    fn test_cache_grows_by_one_per_step() {
        let decoder = ScriptedDecoder::new(vec![3, 4, 5, 3, 4, EOS]);
        run(&decoder, DecodeOptions::default()).unwrap();
        assert_eq!(*decoder.seen_cache_lens.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_terminates_within_max_steps() {
        let decoder = ScriptedDecoder::new(vec![3, 4, 5, 6]);
        let options = DecodeOptions {
            max_steps: 7,
            repetition_threshold: 21,
        };
        let outcome = run(&decoder, options).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::MaxLength);
        assert_eq!(outcome.steps, 7);
        assert_eq!(decoder.seen_cache_lens.lock().unwrap().len(), 7);
    }

    #[test]
    fn test_repetition_stops_before_max_length() {
        // token 6 ("ab") forever
        let decoder = ScriptedDecoder::new(vec![6]);
        let options = DecodeOptions {
            max_steps: 100,
            repetition_threshold: 5,
        };
        let outcome = run(&decoder, options).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Repetition);
        // "ab" x5 is the first text holding a 5-fold pattern
        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.text, "ababababab");
    }

    #[test]
    fn test_repetition_wins_over_eos_on_the_same_step() {
        let state = DecoderState {
            current_token: 3,
            past_key_values: KvCache::empty(CacheLayout::new(1, 1, 1)),
            generated_text: "xxxx".to_string(),
            token_ids: vec![3, 3, 3, EOS],
            step_count: 3,
        };
        let options = DecodeOptions {
            max_steps: 4,
            repetition_threshold: 4,
        };
        assert_eq!(
            stopping_decision(&state, EOS, EOS, &options),
            StoppingDecision::Stop(StopReason::Repetition)
        );
    }

    #[test]
    fn test_eos_wins_over_max_length() {
        let state = DecoderState::new(0, KvCache::empty(CacheLayout::new(1, 1, 1)));
        let options = DecodeOptions {
            max_steps: 1,
            repetition_threshold: 21,
        };
        assert_eq!(
            stopping_decision(&state, EOS, EOS, &options),
            StoppingDecision::Stop(StopReason::Eos)
        );
        assert_eq!(
            stopping_decision(&state, 3, EOS, &options),
            StoppingDecision::Stop(StopReason::MaxLength)
        );
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let script = vec![3, 4, 5, 4, 3, EOS];
        let first = run(&ScriptedDecoder::new(script.clone()), DecodeOptions::default()).unwrap();
        let second = run(&ScriptedDecoder::new(script), DecodeOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_engine_error_aborts_without_text() {
        let mut decoder = ScriptedDecoder::new(vec![3, 4, 5, EOS]);
        decoder.fail_at = Some(2);
        let err = run(&decoder, DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, OCRError::Inference { .. }));
        assert!(err.to_string().ends_with("forced failure: boom"));
    }

    #[test]
    fn test_cache_that_does_not_grow_is_rejected() {
        let mut decoder = ScriptedDecoder::new(vec![3, EOS]);
        decoder.grow_by = 2;
        let err = run(&decoder, DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, OCRError::TensorOperation { .. }));
    }

    #[test]
    fn test_cancellation_is_checked_before_each_step() {
        let decoder = ScriptedDecoder::new(vec![3, 4, EOS]);
        let cancel = CancellationSignal::new();
        cancel.cancel();
        let err = greedy_decode(
            &decoder,
            &MapTokenizer::new(),
            &encoder_output(),
            &DecodeOptions::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, OCRError::Cancelled { steps: 0, .. }));
        assert!(decoder.seen_cache_lens.lock().unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_token_is_an_engine_failure() {
        let decoder = ScriptedDecoder::new(vec![3, 7, EOS]);
        let err = run(&decoder, DecodeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            OCRError::Processing {
                kind: ProcessingStage::Decoding,
                ..
            }
        ));
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("token id 7"));
    }

    #[test]
    fn test_signal_observes_decode_progress() {
        let decoder = ScriptedDecoder::new(vec![3, 4, 5, 6, EOS]);
        let cancel = CancellationSignal::new();
        let outcome = greedy_decode(
            &decoder,
            &MapTokenizer::new(),
            &encoder_output(),
            &DecodeOptions::default(),
            &cancel.clone(),
        )
        .unwrap();
        assert_eq!(outcome.steps, 5);
        assert_eq!(cancel.steps_completed(), 4);
    }

    #[test]
    fn test_argmax_prefers_first_maximum_and_skips_nan() {
        let mut logits = Array3::zeros((1, 2, 5));
        logits[[0, 0, 4]] = 100.0;
        logits[[0, 1, 0]] = f32::NAN;
        logits[[0, 1, 2]] = 3.0;
        logits[[0, 1, 3]] = 3.0;
        assert_eq!(argmax_last_position(&logits).unwrap(), 2);

        let all_nan = Array3::from_elem((1, 1, 3), f32::NAN);
        assert!(argmax_last_position(&all_nan).is_err());
        assert!(argmax_last_position(&Array3::zeros((1, 0, 3))).is_err());
    }

    #[test]
    fn test_zero_max_steps_returns_empty_text() {
        let decoder = ScriptedDecoder::new(vec![3]);
        let options = DecodeOptions {
            max_steps: 0,
            repetition_threshold: 21,
        };
        let outcome = run(&decoder, options).unwrap();
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.stop_reason, StopReason::MaxLength);
        assert!(outcome.text.is_empty());
    }
}
