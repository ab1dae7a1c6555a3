//! Helpers for creating ONNX Runtime sessions from configuration.

use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::OCRError;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use std::path::Path;

/// Creates a session for `model_path` with `config` applied.
pub fn load_session(model_path: impl AsRef<Path>, config: &OrtSessionConfig) -> Result<Session, OCRError> {
    let path = model_path.as_ref();
    if !path.is_file() {
        return Err(OCRError::model_load_error(
            path,
            "model file not found",
            Some("check the model directory contains the exported ONNX files"),
            None::<OCRError>,
        ));
    }

    let builder = Session::builder()?.with_log_level(LogLevel::Error)?;
    let builder = apply_ort_config(builder, config).map_err(|e| {
        OCRError::model_load_error(
            path,
            "invalid ONNX Runtime session configuration",
            Some("check device and thread settings"),
            Some(e),
        )
    })?;
    builder.commit_from_file(path).map_err(|e| {
        OCRError::model_load_error(
            path,
            "failed to create ONNX session",
            Some("check device/EP configuration and model file"),
            Some(e),
        )
    })
}

/// Maps [`OrtSessionConfig`] onto a session builder.
pub fn apply_ort_config(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(intra) = cfg.intra_threads {
        builder = builder.with_intra_threads(intra)?;
    }
    if let Some(inter) = cfg.inter_threads {
        builder = builder.with_inter_threads(inter)?;
    }
    if let Some(par) = cfg.parallel_execution {
        builder = builder.with_parallel_execution(par)?;
    }
    if let Some(level) = cfg.optimization_level {
        let mapped = match level {
            OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
            OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
            OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
            OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        };
        builder = builder.with_optimization_level(mapped)?;
    }
    if let Some(eps) = &cfg.execution_providers {
        let providers = build_execution_providers(eps)?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
    }
    Ok(builder)
}

fn build_execution_providers(
    eps: &[OrtExecutionProvider],
) -> Result<Vec<ExecutionProviderDispatch>, ort::Error> {
    use OrtExecutionProvider as EP;
    let mut providers = Vec::new();

    for ep in eps {
        match ep {
            EP::CPU => {
                providers.push(ort::execution_providers::CPUExecutionProvider::default().build());
            }
            #[cfg(feature = "cuda")]
            EP::CUDA { device_id } => {
                let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda = cuda.with_device_id(*id);
                }
                providers.push(cuda.build());
            }
            #[cfg(feature = "directml")]
            EP::DirectML { device_id } => {
                let mut dml = ort::execution_providers::DirectMLExecutionProvider::default();
                if let Some(id) = device_id {
                    dml = dml.with_device_id(*id);
                }
                providers.push(dml.build());
            }
            #[cfg(feature = "coreml")]
            EP::CoreML { subgraphs } => {
                let mut coreml = ort::execution_providers::CoreMLExecutionProvider::default();
                if let Some(sub) = subgraphs {
                    coreml = coreml.with_subgraphs(*sub);
                }
                providers.push(coreml.build());
            }
            #[cfg(not(feature = "cuda"))]
            EP::CUDA { .. } => {
                return Err(ort::Error::new(
                    "CUDA execution provider requested but cuda feature is not enabled",
                ));
            }
            #[cfg(not(feature = "directml"))]
            EP::DirectML { .. } => {
                return Err(ort::Error::new(
                    "DirectML execution provider requested but directml feature is not enabled",
                ));
            }
            #[cfg(not(feature = "coreml"))]
            EP::CoreML { .. } => {
                return Err(ort::Error::new(
                    "CoreML execution provider requested but coreml feature is not enabled",
                ));
            }
        }
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_session(dir.path().join("encoder_model.onnx"), &OrtSessionConfig::default())
            .unwrap_err();
        match err {
            OCRError::ModelLoad { reason, .. } => assert_eq!(reason, "model file not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_rejected() {
        let result = build_execution_providers(&[OrtExecutionProvider::CUDA { device_id: None }]);
        assert!(result.is_err());
    }
}
