//! Pooled ONNX Runtime sessions for a single model file.

use super::session::load_session;
use crate::core::config::OrtSessionConfig;
use crate::core::errors::{OCRError, SimpleError};
use ort::session::Session;
use ort::value::ValueType;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pool of sessions over one model.
///
/// `Session::run` needs exclusive access, so each session sits behind a
/// mutex and calls are spread round-robin over the pool.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_names: Vec<String>,
    output_names: Vec<String>,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Creates `config.pool_size()` sessions for `model_path`.
    pub fn from_config(config: &OrtSessionConfig, model_path: impl AsRef<Path>) -> Result<Self, OCRError> {
        let path = model_path.as_ref();
        let pool_size = config.pool_size();
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            sessions.push(Mutex::new(load_session(path, config)?));
        }

        let (input_names, output_names) = {
            let first = sessions[0].lock().map_err(|_| {
                OCRError::model_load_error(
                    path,
                    "session lock poisoned while reading model metadata",
                    None,
                    None::<OCRError>,
                )
            })?;
            (
                first.inputs.iter().map(|i| i.name.clone()).collect::<Vec<_>>(),
                first.outputs.iter().map(|o| o.name.clone()).collect::<Vec<_>>(),
            )
        };

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        tracing::debug!(
            "loaded {} ({} session(s)): inputs {:?}, outputs {:?}",
            model_name,
            pool_size,
            input_names,
            output_names
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_names,
            output_names,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Input tensor names in declaration order.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Output tensor names in declaration order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input_names.iter().any(|n| n == name)
    }

    /// Attempts to retrieve the primary input tensor shape from the first session.
    ///
    /// Dynamic dimensions are returned as `-1`.
    pub fn primary_input_shape(&self) -> Option<Vec<i64>> {
        let session = self.sessions.first()?.lock().ok()?;
        let input = session.inputs.first()?;
        match &input.input_type {
            ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
            _ => None,
        }
    }

    /// Runs `f` with exclusive access to the next session in the pool.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, OCRError>,
    ) -> Result<T, OCRError> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut guard = self.sessions[idx].lock().map_err(|_| {
            OCRError::inference_error(
                &self.model_name,
                &format!(
                    "Failed to acquire session lock for session {}/{}",
                    idx,
                    self.sessions.len()
                ),
                SimpleError::new("Session lock acquisition failed"),
            )
        })?;
        f(&mut guard)
    }
}

/// Converts a runtime shape into `usize` dimensions, rejecting dynamic or
/// negative entries.
pub fn shape_to_usize(shape: &[i64]) -> Option<Vec<usize>> {
    shape.iter().map(|&d| usize::try_from(d).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_to_usize() {
        assert_eq!(shape_to_usize(&[1, 12, 0, 64]), Some(vec![1, 12, 0, 64]));
        assert_eq!(shape_to_usize(&[1, -1, 64]), None);
    }

    #[test]
    fn test_from_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OrtInfer::from_config(
            &OrtSessionConfig::default(),
            dir.path().join("decoder_model_merged.onnx"),
        )
        .unwrap_err();
        assert!(matches!(err, OCRError::ModelLoad { .. }));
    }
}
