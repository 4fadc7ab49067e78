//! `decompose`: slice videos without captioning

use super::ConfigArgs;
use anyhow::{bail, Result};
use clap::Args;
use task_dataset_decomposer::{decompose_all, discover_videos, FfmpegDecoder};
use tracing::{info, warn};

#[derive(Args)]
pub struct DecomposeCommand {
    #[command(flatten)]
    config: ConfigArgs,
}

impl DecomposeCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.config.resolve()?;
        let videos = discover_videos(&config.videos_dir, &config.video_extensions)?;
        info!(
            "Decomposing {} videos with {} jobs",
            videos.len(),
            config.decompose_jobs
        );

        let decoder = FfmpegDecoder::new(config.audio.clone());
        let outcomes = decompose_all(
            &decoder,
            &videos,
            &config.frames_dir,
            &config.audio_dir,
            &config.slice_settings(),
            config.decompose_jobs,
        )?;

        let mut failed = 0;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(video) => info!(
                    "{} -> {}, {}",
                    video.name,
                    video.frames_dir.display(),
                    video.audio_dir.display()
                ),
                Err(e) => {
                    warn!("{}: {}", outcome.video_path.display(), e);
                    failed += 1;
                }
            }
        }

        info!(
            "Decomposed {}/{} videos",
            outcomes.len() - failed,
            outcomes.len()
        );
        if failed == outcomes.len() {
            bail!("No video could be decomposed");
        }
        Ok(())
    }
}
