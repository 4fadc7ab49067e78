//! Subcommand implementations and the options they share

pub mod assemble;
pub mod build;
pub mod caption;
pub mod decompose;
pub mod extract_audio;
pub mod rename;

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use task_dataset_caption::OnnxCaptionerFactory;
use task_dataset_core::onnx_utils::intra_threads_per_worker;
use task_dataset_core::PipelineConfig;
use tracing::debug;

/// Configuration file plus per-field overrides
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory containing the input videos
    #[arg(long)]
    videos_dir: Option<PathBuf>,

    /// Root directory for extracted frames
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Root directory for audio segments
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// Dataset file to write
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory with blip.onnx and tokenizer.json
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Slice length in seconds
    #[arg(long)]
    slice_duration: Option<f64>,

    /// Caption worker threads (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Videos decomposed in parallel
    #[arg(long)]
    jobs: Option<usize>,

    /// Per-frame caption timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,
}

impl ConfigArgs {
    /// Defaults < YAML file < environment < these flags
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(dir) = &self.videos_dir {
            config.videos_dir = dir.clone();
        }
        if let Some(dir) = &self.frames_dir {
            config.frames_dir = dir.clone();
        }
        if let Some(dir) = &self.audio_dir {
            config.audio_dir = dir.clone();
        }
        if let Some(path) = &self.output {
            config.output = path.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(seconds) = self.slice_duration {
            config.slice_duration = seconds;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(jobs) = self.jobs {
            config.decompose_jobs = jobs;
        }
        if let Some(timeout) = self.timeout {
            config.item_timeout_secs = Some(timeout);
        }

        config.validate().context("Invalid configuration")?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

/// Caption model factory for `config`, splitting cores between workers
pub fn caption_factory(config: &PipelineConfig) -> Result<OnnxCaptionerFactory> {
    OnnxCaptionerFactory::from_model_dir(
        &config.model_dir,
        config.caption.clone().into(),
        intra_threads_per_worker(config.workers),
    )
    .context("Failed to locate caption model")
}
