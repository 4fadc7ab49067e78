//! Per-worker model loading for the caption pool

use std::path::{Path, PathBuf};
use task_dataset_common::{ProcessingError, Result};
use task_dataset_core::CaptionerFactory;
use tracing::info;

use crate::{CaptionConfig, CaptionGenerator};

/// ONNX model file name inside the model directory
pub const MODEL_FILE: &str = "blip.onnx";
/// Tokenizer file name inside the model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Loads one [`CaptionGenerator`] per caption worker
#[derive(Debug, Clone)]
pub struct OnnxCaptionerFactory {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    config: CaptionConfig,
    intra_threads: usize,
}

impl OnnxCaptionerFactory {
    /// Point at `<model_dir>/blip.onnx` and `<model_dir>/tokenizer.json`.
    ///
    /// Fails early if either file is missing so a run does not decompose
    /// every video only to caption nothing.
    pub fn from_model_dir(model_dir: &Path, config: CaptionConfig, intra_threads: usize) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        for path in [&model_path, &tokenizer_path] {
            if !path.is_file() {
                return Err(ProcessingError::InvalidConfig(format!(
                    "caption model file not found: {}",
                    path.display()
                )));
            }
        }

        Ok(Self {
            model_path,
            tokenizer_path,
            config,
            intra_threads: intra_threads.max(1),
        })
    }
}

impl CaptionerFactory for OnnxCaptionerFactory {
    type Captioner = CaptionGenerator;

    fn load(&self, worker: usize) -> Result<CaptionGenerator> {
        info!(
            "Worker {} loading caption model ({} intra threads)",
            worker, self.intra_threads
        );
        CaptionGenerator::new(
            &self.model_path,
            &self.tokenizer_path,
            self.config.clone(),
            self.intra_threads,
        )
        .map_err(ProcessingError::from)
    }
}
