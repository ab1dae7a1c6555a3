//! Cooperative cancellation for long-running requests.

use crate::core::OCRError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A cancellation flag with an optional deadline.
///
/// Clones share the flag, so a caller can keep one clone and cancel a request
/// running elsewhere. The decode loop checks it before every step, and the
/// step count it reports is visible to every clone.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
    progress: Arc<AtomicUsize>,
    deadline: Option<Instant>,
}

impl CancellationSignal {
    /// A signal that only fires when [`CancellationSignal::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Decode steps completed as of the last [`CancellationSignal::check`].
    pub fn steps_completed(&self) -> usize {
        self.progress.load(Ordering::Acquire)
    }

    /// Records `steps` as completed and returns `OCRError::Cancelled` if the
    /// signal has fired.
    pub fn check(&self, steps: usize) -> Result<(), OCRError> {
        self.progress.store(steps, Ordering::Release);
        if self.flag.load(Ordering::Acquire) {
            return Err(OCRError::cancelled(steps, "cancelled by caller"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(OCRError::cancelled(steps, "deadline exceeded"));
        }
        Ok(())
    }
}
