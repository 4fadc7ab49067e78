//! Pipeline configuration
//!
//! Precedence: defaults < YAML file < `TASK_DATASET_WORKERS` < CLI flags (the
//! CLI applies its own overrides after [`PipelineConfig::load`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use task_dataset_common::{ProcessingError, Result, SliceNaming};
use task_dataset_decomposer::{AudioSettings, SliceSettings, DEFAULT_VIDEO_EXTENSIONS};
use tracing::debug;

use crate::executor::PoolConfig;

/// Environment variable overriding the caption worker count
pub const WORKERS_ENV: &str = "TASK_DATASET_WORKERS";

/// Caption model settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    /// Square input size of the vision encoder (384 for BLIP)
    pub input_size: u32,
    /// Maximum caption length in tokens
    pub max_length: usize,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            input_size: 384,
            max_length: 20,
        }
    }
}

/// Full configuration of a dataset build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub videos_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub audio_dir: PathBuf,
    /// Dataset artifact path
    pub output: PathBuf,
    /// Slice length in seconds
    pub slice_duration: f64,
    pub video_extensions: Vec<String>,
    pub image_extension: String,
    pub audio: AudioSettings,
    /// Caption worker threads
    pub workers: usize,
    /// Videos decomposed concurrently
    pub decompose_jobs: usize,
    pub item_timeout_secs: Option<f64>,
    /// Directory holding `blip.onnx` and `tokenizer.json`
    pub model_dir: PathBuf,
    pub caption: CaptionSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            videos_dir: PathBuf::from("videos"),
            frames_dir: PathBuf::from("frames"),
            audio_dir: PathBuf::from("audio"),
            output: PathBuf::from("dataset.json"),
            slice_duration: 1.0,
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            image_extension: "jpg".to_string(),
            audio: AudioSettings::default(),
            workers: num_cpus::get(),
            decompose_jobs: 1,
            item_timeout_secs: None,
            model_dir: PathBuf::from("models/caption-generation"),
            caption: CaptionSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with `path` if given, then with the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML config file; missing fields keep their defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ProcessingError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = serde_yaml::from_str(&data).map_err(|e| {
            ProcessingError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(WORKERS_ENV) {
            self.workers = value.trim().parse().map_err(|_| {
                ProcessingError::InvalidConfig(format!("{WORKERS_ENV} must be an integer, got {value:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.slice_settings().validate()?;
        if self.workers == 0 {
            return Err(ProcessingError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.decompose_jobs == 0 {
            return Err(ProcessingError::InvalidConfig(
                "decompose_jobs must be at least 1".to_string(),
            ));
        }
        if self.video_extensions.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "video_extensions must not be empty".to_string(),
            ));
        }
        if self.image_extension.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "image_extension must not be empty".to_string(),
            ));
        }
        if let Some(secs) = self.item_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ProcessingError::InvalidConfig(format!(
                    "item_timeout_secs must be positive, got {secs}"
                )));
            }
            Duration::try_from_secs_f64(secs).map_err(|e| {
                ProcessingError::InvalidConfig(format!("item_timeout_secs {secs}: {e}"))
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn naming(&self) -> SliceNaming {
        SliceNaming::new(self.image_extension.clone(), self.audio.format.extension())
    }

    #[must_use]
    pub fn slice_settings(&self) -> SliceSettings {
        SliceSettings {
            slice_duration: self.slice_duration,
            naming: self.naming(),
        }
    }

    /// Pool settings. A timeout that [`Self::validate`] would reject is dropped.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            item_timeout: self
                .item_timeout_secs
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        }
    }
}
