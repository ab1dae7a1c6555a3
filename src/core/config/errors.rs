//! Configuration error types and validation traits.

use crate::core::errors::OCRError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A model path does not exist.
    #[error("model path does not exist: {path}")]
    ModelPathNotFound { path: std::path::PathBuf },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A configuration file could not be parsed.
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for OCRError {
    fn from(err: ConfigError) -> Self {
        OCRError::config_error(err.to_string())
    }
}

/// A trait for validating configuration parameters.
pub trait ConfigValidator {
    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// A Result indicating success or a ConfigError if validation fails.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates that a model path exists and is a file.
    fn validate_model_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ModelPathNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Validates that a count-like value is non-zero.
    fn validate_positive(&self, field: &str, value: usize) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidConfig {
                message: format!("{field} must be greater than 0"),
            });
        }
        Ok(())
    }
}

/// Reads and deserializes a JSON configuration file.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
