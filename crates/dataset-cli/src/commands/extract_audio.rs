//! `extract-audio`: whole-track audio per video

use super::ConfigArgs;
use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use task_dataset_decomposer::{discover_videos, FfmpegDecoder};
use tracing::{info, warn};

#[derive(Args)]
pub struct ExtractAudioCommand {
    #[command(flatten)]
    config: ConfigArgs,

    /// Output directory for the audio files (default: the configured audio dir)
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

impl ExtractAudioCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.config.resolve()?;
        let out_dir = self.out_dir.unwrap_or_else(|| config.audio_dir.clone());
        let videos = discover_videos(&config.videos_dir, &config.video_extensions)?;
        let decoder = FfmpegDecoder::new(config.audio.clone());

        let mut extracted = 0;
        for video in &videos {
            match decoder.extract_full_audio(video, &out_dir) {
                Ok(path) => {
                    info!("{} -> {}", video.display(), path.display());
                    extracted += 1;
                }
                Err(e) => warn!("{}: {}", video.display(), e),
            }
        }

        info!("Extracted audio from {}/{} videos", extracted, videos.len());
        if extracted == 0 {
            bail!("No audio could be extracted");
        }
        Ok(())
    }
}
