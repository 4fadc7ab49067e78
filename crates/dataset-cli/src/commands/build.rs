//! `build`: the full pipeline

use super::{caption_factory, ConfigArgs};
use anyhow::{Context as _, Result};
use clap::Args;
use std::time::Instant;
use task_dataset_core::DatasetBuilder;
use task_dataset_decomposer::FfmpegDecoder;
use tracing::info;

#[derive(Args)]
pub struct BuildCommand {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    summary_json: bool,
}

impl BuildCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.config.resolve()?;
        let start = Instant::now();

        info!("=== Dataset build ===");
        info!("Videos: {}", config.videos_dir.display());
        info!(
            "Slices: {}s, caption workers: {}",
            config.slice_duration, config.workers
        );

        let factory = caption_factory(&config)?;
        let decoder = FfmpegDecoder::new(config.audio.clone());
        let output = config.output.clone();

        let mut builder = DatasetBuilder::new(decoder, factory, config)?;
        let summary = builder.run().context("Dataset build failed")?;
        builder.shutdown();

        info!(
            "Dataset written to {} in {:.2}s",
            output.display(),
            start.elapsed().as_secs_f64()
        );

        if self.summary_json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Ok(())
    }
}
