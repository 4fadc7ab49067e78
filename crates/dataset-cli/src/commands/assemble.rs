//! `assemble`: caption an existing decomposition

use super::{caption_factory, ConfigArgs};
use anyhow::{Context as _, Result};
use clap::Args;
use task_dataset_core::DatasetBuilder;
use task_dataset_decomposer::FfmpegDecoder;
use tracing::info;

#[derive(Args)]
pub struct AssembleCommand {
    #[command(flatten)]
    config: ConfigArgs,
}

impl AssembleCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.config.resolve()?;
        info!(
            "Assembling from {} and {}",
            config.frames_dir.display(),
            config.audio_dir.display()
        );

        let factory = caption_factory(&config)?;
        let mut builder = DatasetBuilder::new(FfmpegDecoder::default(), factory, config)?;
        let summary = builder
            .build_from_decomposed()
            .context("Dataset assembly failed")?;
        builder.shutdown();

        info!("{} entries written", summary.entries);
        Ok(())
    }
}
