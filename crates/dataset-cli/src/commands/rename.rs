//! `rename`: name frames after their captions

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use task_dataset_core::rename_dataset;

#[derive(Args)]
pub struct RenameCommand {
    /// Dataset file produced by `build` or `assemble`
    #[arg(value_name = "DATASET")]
    dataset: PathBuf,
}

impl RenameCommand {
    pub fn execute(self) -> Result<()> {
        let report = rename_dataset(&self.dataset)
            .with_context(|| format!("Failed to rename frames of {}", self.dataset.display()))?;
        println!(
            "renamed: {}, skipped: {}, missing: {}",
            report.renamed, report.skipped, report.missing
        );
        Ok(())
    }
}
