//! ONNX Runtime configuration types.

use super::errors::{ConfigError, ConfigValidator};
use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    #[default]
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

/// Execution providers for ONNX Runtime.
///
/// Providers other than CPU require the matching crate feature.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available)
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider
    CUDA {
        /// CUDA device ID (default: 0)
        device_id: Option<i32>,
    },
    /// DirectML execution provider (Windows only)
    DirectML {
        /// DirectML device ID (default: 0)
        device_id: Option<i32>,
    },
    /// CoreML execution provider (macOS/iOS only)
    CoreML {
        /// Enable subgraphs
        subgraphs: Option<bool>,
    },
}

impl OrtExecutionProvider {
    /// Parses a device string such as `cpu`, `cuda`, `cuda:1`, `directml` or `coreml`.
    pub fn from_device(device: &str) -> Result<Self, ConfigError> {
        let lower = device.trim().to_ascii_lowercase();
        let (name, index) = match lower.split_once(':') {
            Some((name, idx)) => {
                let idx = idx.parse::<i32>().map_err(|_| ConfigError::InvalidConfig {
                    message: format!("invalid device index in '{device}'"),
                })?;
                (name.to_string(), Some(idx))
            }
            None => (lower, None),
        };
        match name.as_str() {
            "cpu" => Ok(Self::CPU),
            "cuda" | "gpu" => Ok(Self::CUDA { device_id: index }),
            "directml" | "dml" => Ok(Self::DirectML { device_id: index }),
            "coreml" => Ok(Self::CoreML { subgraphs: None }),
            _ => Err(ConfigError::InvalidConfig {
                message: format!("unknown device '{device}'"),
            }),
        }
    }
}

/// Configuration for ONNX Runtime sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes
    pub inter_threads: Option<usize>,
    /// Enable parallel execution mode
    pub parallel_execution: Option<bool>,
    /// Graph optimization level
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Number of sessions created per model so concurrent requests do not
    /// serialize on a single session lock.
    pub session_pool_size: Option<usize>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the number of inter-op threads.
    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Sets the execution providers.
    ///
    /// # Arguments
    ///
    /// * `providers` - Vector of execution providers in order of preference.
    pub fn with_execution_providers(mut self, providers: Vec<OrtExecutionProvider>) -> Self {
        self.execution_providers = Some(providers);
        self
    }

    /// Sets the number of sessions per model.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = Some(size);
        self
    }

    /// Returns the effective session pool size (at least 1).
    pub fn pool_size(&self) -> usize {
        self.session_pool_size.unwrap_or(1).max(1)
    }
}

impl ConfigValidator for OrtSessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(threads) = self.intra_threads {
            self.validate_positive("intra_threads", threads)?;
        }
        if let Some(threads) = self.inter_threads {
            self.validate_positive("inter_threads", threads)?;
        }
        if let Some(size) = self.session_pool_size {
            self.validate_positive("session_pool_size", size)?;
        }
        if let Some(providers) = &self.execution_providers
            && providers.is_empty()
        {
            return Err(ConfigError::InvalidConfig {
                message: "execution_providers must not be empty when set".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        assert_eq!(
            OrtExecutionProvider::from_device("cpu").unwrap(),
            OrtExecutionProvider::CPU
        );
        assert_eq!(
            OrtExecutionProvider::from_device("CUDA:1").unwrap(),
            OrtExecutionProvider::CUDA { device_id: Some(1) }
        );
        assert!(OrtExecutionProvider::from_device("tpu").is_err());
        assert!(OrtExecutionProvider::from_device("cuda:x").is_err());
    }

    #[test]
    fn test_validation_rejects_zero_pool() {
        let cfg = OrtSessionConfig::new().with_session_pool_size(0);
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.pool_size(), 1);
    }

    #[test]
    fn test_serde_defaults() {
        let cfg: OrtSessionConfig = serde_json::from_str(r#"{"intra_threads": 4}"#).unwrap();
        assert_eq!(cfg.intra_threads, Some(4));
        assert!(cfg.execution_providers.is_none());
        assert!(cfg.validate().is_ok());
    }
}
