//! `caption`: caption every frame under a directory

use super::{caption_factory, ConfigArgs};
use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use task_dataset_core::CaptionPool;
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// `<frame>: <caption>` per line
    Text,
    /// One JSON object per line
    Jsonl,
}

#[derive(Serialize)]
struct CaptionLine<'a> {
    frame_path: &'a Path,
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Args)]
pub struct CaptionCommand {
    /// Directory searched recursively for frames (default: the configured frames dir)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl CaptionCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.config.resolve()?;
        let dir = self.dir.unwrap_or_else(|| config.frames_dir.clone());

        let mut frames = Vec::new();
        collect_frames(&dir, &config.image_extension, &mut frames)?;
        if frames.is_empty() {
            bail!("No .{} frames found under {}", config.image_extension, dir.display());
        }
        frames.sort();
        info!("Captioning {} frames with {} workers", frames.len(), config.workers);

        let mut pool = CaptionPool::new(caption_factory(&config)?, config.pool_config())?;
        let mut results = pool.caption_frames(frames);
        pool.shutdown();
        results.sort_by(|a, b| a.frame_path.cmp(&b.frame_path));

        for result in &results {
            match self.format {
                OutputFormat::Text => match &result.caption {
                    Ok(text) => println!("{}: {}", result.frame_path.display(), text),
                    Err(_) => println!("{}: error", result.frame_path.display()),
                },
                OutputFormat::Jsonl => {
                    let line = CaptionLine {
                        frame_path: &result.frame_path,
                        caption: result.caption.as_deref().ok(),
                        error: result.caption.as_ref().err().map(ToString::to_string),
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
            }
        }
        Ok(())
    }
}

/// Every file below `dir` with `extension` (case-insensitive)
fn collect_frames(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_frames(&path, extension, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            out.push(path);
        }
    }
    Ok(())
}
