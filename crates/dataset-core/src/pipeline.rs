//! End-to-end dataset build: decompose, pair, caption, assemble, persist
//!
//! Every video is decomposed before captioning starts. Captioning then runs
//! video by video through one long-lived [`CaptionPool`], so each worker's
//! model is loaded once per run.

use serde::Serialize;
use std::path::Path;
use task_dataset_common::{ProcessingError, Result};
use task_dataset_decomposer::{
    decompose_all, discover_videos, DecomposedVideo, Decoder,
};
use tracing::{info, warn};

use crate::assembler::{assemble, persist, Dataset, VideoCaptions};
use crate::config::PipelineConfig;
use crate::executor::{CaptionPool, CaptionerFactory};
use crate::pairing::pair;

/// Counters for one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub videos_found: usize,
    pub videos_decoded: usize,
    pub videos_failed: usize,
    pub pairs: usize,
    /// Frames dropped for lack of a matching audio segment
    pub gaps: usize,
    pub captions_ok: usize,
    pub captions_failed: usize,
    pub entries: usize,
}

impl RunSummary {
    fn log(&self) {
        info!(
            "Videos: {} found, {} decoded, {} failed | pairs: {} ({} gaps) | captions: {} ok, {} failed | entries: {}",
            self.videos_found,
            self.videos_decoded,
            self.videos_failed,
            self.pairs,
            self.gaps,
            self.captions_ok,
            self.captions_failed,
            self.entries
        );
    }
}

/// Builds a dataset with a decoder and a captioner factory
pub struct DatasetBuilder<D: Decoder, F: CaptionerFactory> {
    decoder: D,
    pool: CaptionPool<F>,
    config: PipelineConfig,
}

impl<D: Decoder, F: CaptionerFactory> DatasetBuilder<D, F> {
    /// Validate `config` and start the caption pool
    pub fn new(decoder: D, factory: F, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let pool = CaptionPool::new(factory, config.pool_config())?;
        Ok(Self {
            decoder,
            pool,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decompose every video in `videos_dir`, caption all pairs and write the
    /// artifact to `output`.
    ///
    /// Only a missing input (`NoVideosFound`) or a persist failure aborts the
    /// run; per-video and per-item failures are logged and counted.
    pub fn run(&mut self) -> Result<RunSummary> {
        let config = &self.config;
        let videos = discover_videos(&config.videos_dir, &config.video_extensions)?;
        info!(
            "Found {} videos in {}",
            videos.len(),
            config.videos_dir.display()
        );

        let mut summary = RunSummary {
            videos_found: videos.len(),
            ..Default::default()
        };

        let outcomes = decompose_all(
            &self.decoder,
            &videos,
            &config.frames_dir,
            &config.audio_dir,
            &config.slice_settings(),
            config.decompose_jobs,
        )?;

        let mut decomposed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.result {
                Ok(video) => {
                    summary.videos_decoded += 1;
                    decomposed.push(video);
                }
                Err(e) => {
                    warn!("Excluding {}: {}", outcome.video_path.display(), e);
                    summary.videos_failed += 1;
                }
            }
        }

        self.finish(&decomposed, summary)
    }

    /// Build the dataset from an existing decomposition under `frames_dir` and
    /// `audio_dir` without decoding anything
    pub fn build_from_decomposed(&mut self) -> Result<RunSummary> {
        let videos = existing_decomposition(&self.config.frames_dir, &self.config.audio_dir)?;
        let summary = RunSummary {
            videos_found: videos.len(),
            videos_decoded: videos.len(),
            ..Default::default()
        };
        self.finish(&videos, summary)
    }

    /// Shut the caption pool down
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }

    fn finish(&mut self, videos: &[DecomposedVideo], mut summary: RunSummary) -> Result<RunSummary> {
        let dataset = self.caption_videos(videos, &mut summary);
        summary.entries = dataset.len();
        persist(&dataset, &self.config.output)?;
        summary.log();
        Ok(summary)
    }

    fn caption_videos(&mut self, videos: &[DecomposedVideo], summary: &mut RunSummary) -> Dataset {
        let naming = self.config.naming();
        let mut per_video = Vec::with_capacity(videos.len());

        for video in videos {
            let report = match pair(&video.name, &video.frames_dir, &video.audio_dir, &naming) {
                Ok(report) => report,
                Err(e) => {
                    warn!("Excluding {}: {}", video.name, e);
                    summary.videos_failed += 1;
                    summary.videos_decoded = summary.videos_decoded.saturating_sub(1);
                    continue;
                }
            };

            summary.pairs += report.pairs.len();
            summary.gaps += report.gap_count();
            info!(
                "Captioning {} slices of {} ({} gaps)",
                report.pairs.len(),
                video.name,
                report.gap_count()
            );

            let slices = self.pool.generate(report.pairs);
            let ok = slices.iter().filter(|s| s.caption.is_some()).count();
            summary.captions_ok += ok;
            summary.captions_failed += slices.len() - ok;

            per_video.push(VideoCaptions {
                video: video.name.clone(),
                slices,
            });
        }

        assemble(per_video)
    }
}

/// Per-video directories of an earlier decomposition: subdirectories of
/// `frames_root` in name order, each matched with the same-named directory
/// under `audio_root`
pub fn existing_decomposition(frames_root: &Path, audio_root: &Path) -> Result<Vec<DecomposedVideo>> {
    let mut videos: Vec<DecomposedVideo> = std::fs::read_dir(frames_root)
        .map_err(|e| {
            ProcessingError::InvalidConfig(format!(
                "cannot read frames directory {}: {e}",
                frames_root.display()
            ))
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some(DecomposedVideo {
                source: entry.path(),
                frames_dir: entry.path(),
                audio_dir: audio_root.join(&name),
                name,
            })
        })
        .collect();

    videos.sort_by(|a, b| a.name.cmp(&b.name));

    if videos.is_empty() {
        return Err(ProcessingError::NoVideosFound(frames_root.to_path_buf()));
    }
    Ok(videos)
}
