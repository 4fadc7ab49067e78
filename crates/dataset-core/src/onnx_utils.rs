//! ONNX Runtime session creation for captioning workers
//!
//! Every caption worker owns its own session, so the intra-op thread count is
//! divided between workers instead of each session claiming every core.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op threads for one of `workers` concurrent sessions
#[must_use]
pub fn intra_threads_per_worker(workers: usize) -> usize {
    (num_cpus::get_physical() / workers.max(1)).max(1)
}

/// Directory for compiled CoreML models.
///
/// `TASK_DATASET_COREML_CACHE_DIR` wins, then `$HOME/.cache/task-dataset/coreml`,
/// then the system temp dir.
fn coreml_cache_dir() -> String {
    let dir = std::env::var("TASK_DATASET_COREML_CACHE_DIR").unwrap_or_else(|_| {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.cache/task-dataset/coreml"),
            Err(_) => std::env::temp_dir()
                .join("task-dataset-coreml")
                .display()
                .to_string(),
        }
    });

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create CoreML cache directory {}: {}", dir, e);
    }
    dir
}

fn base_builder(intra_threads: usize) -> Result<SessionBuilder, OnnxError> {
    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(intra_threads.max(1))
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))
}

/// Create an optimized ONNX Runtime session
///
/// Execution providers are tried in order CoreML, CUDA, CPU. If CoreML
/// cannot compile the model the session is rebuilt with CUDA/CPU only.
pub fn create_optimized_session(
    model_path: &Path,
    intra_threads: usize,
) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let start = Instant::now();
    let cache_dir = coreml_cache_dir();

    let session = base_builder(intra_threads)?
        .with_execution_providers([
            CoreMLExecutionProvider::default()
                .with_subgraphs(true)
                .with_model_cache_dir(cache_dir)
                .build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    match session {
        Ok(s) => {
            debug!(
                "Session created for {} in {:.3}s ({} intra threads)",
                model_path.display(),
                start.elapsed().as_secs_f64(),
                intra_threads
            );
            Ok(s)
        }
        Err(e) => {
            let error_msg = e.to_string();
            if !(error_msg.contains("CoreML") || error_msg.contains("MLModel")) {
                return Err(OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: error_msg,
                });
            }

            debug!(
                "CoreML failed for {}: {}; retrying with CUDA/CPU",
                model_path.display(),
                error_msg
            );

            base_builder(intra_threads)?
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: format!("CoreML failed, CPU/CUDA also failed: {e}"),
                })
        }
    }
}
