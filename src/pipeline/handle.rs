//! Reloadable shared pipeline.

use super::cancel::CancellationSignal;
use super::mixtex::{InferenceResult, MixTexPipeline, Recognition};
use crate::core::OCRError;
use crate::processors::PostprocessOptions;
use image::RgbImage;
use std::sync::{Arc, Mutex, RwLock};

/// Holds the currently served pipeline, if any.
///
/// Requests clone the inner `Arc` and run without holding any lock, so a
/// reload never waits for in-flight requests and those requests finish on the
/// pipeline they started with. Reloads are serialized, and the new pipeline is
/// built before the swap so a failed reload leaves the old one in place.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<MixTexPipeline>>>,
    reload_lock: Mutex<()>,
}

impl ModelHandle {
    /// A handle with no pipeline loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_pipeline(pipeline: MixTexPipeline) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(pipeline))),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// The pipeline new requests should use.
    ///
    /// # Errors
    ///
    /// `OCRError::ModelUnavailable` when nothing is loaded.
    pub fn current(&self) -> Result<Arc<MixTexPipeline>, OCRError> {
        let guard = self
            .current
            .read()
            .map_err(|_| OCRError::model_unavailable("model handle lock poisoned"))?;
        guard
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| OCRError::model_unavailable("model not loaded"))
    }

    /// Replaces the served pipeline and returns the previous one.
    pub fn replace(&self, pipeline: MixTexPipeline) -> Option<Arc<MixTexPipeline>> {
        let new = Arc::new(pipeline);
        match self.current.write() {
            Ok(mut guard) => guard.replace(new),
            Err(poisoned) => poisoned.into_inner().replace(new),
        }
    }

    /// Builds a pipeline with `load` and swaps it in.
    ///
    /// Only one reload runs at a time. On failure the served pipeline is left
    /// untouched and the error is returned.
    pub fn reload<F>(&self, load: F) -> Result<(), OCRError>
    where
        F: FnOnce() -> Result<MixTexPipeline, OCRError>,
    {
        let _reloading = self
            .reload_lock
            .lock()
            .map_err(|_| OCRError::model_unavailable("reload lock poisoned"))?;
        let pipeline = load()?;
        self.replace(pipeline);
        tracing::info!("model reloaded");
        Ok(())
    }

    /// Recognizes `image` with the current pipeline.
    pub fn recognize(
        &self,
        image: &RgbImage,
        options: &PostprocessOptions,
        cancel: &CancellationSignal,
    ) -> Result<Recognition, OCRError> {
        self.current()?.recognize(image, options, cancel)
    }

    /// Recognizes `image` with the current pipeline, reporting a missing model
    /// as a failure before doing any work.
    pub fn run_ocr(&self, image: &RgbImage, use_dollars: bool, convert_align: bool) -> InferenceResult {
        match self.current() {
            Ok(pipeline) => pipeline.run_ocr(image, use_dollars, convert_align),
            Err(err) => InferenceResult::Failure(err.to_string()),
        }
    }
}
