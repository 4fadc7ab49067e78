//! Video decomposition into per-slice frames and audio segments
//!
//! Every video gets its own subdirectory under the frame root and the audio
//! root, named after the video's file stem. The actual decode is delegated to a
//! [`Decoder`]; [`FfmpegDecoder`] drives the `ffmpeg` CLI.
//!
//! Frame and audio-segment counts are both derived from the video length and
//! the slice duration but are not guaranteed to be equal (the decoder may round
//! the tail differently), so callers must list the directories afterwards
//! rather than assume a count.

pub mod audio;
pub mod ffmpeg;

pub use audio::{AudioFormat, AudioSettings};
pub use ffmpeg::FfmpegDecoder;

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use task_dataset_common::{ProcessingError, Result, SliceNaming};
use tracing::{debug, info, warn};

/// Default video extensions picked up from the input directory
pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "mov"];

/// Slice parameters shared by every video of a run
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSettings {
    /// Slice length in seconds
    pub slice_duration: f64,
    pub naming: SliceNaming,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            slice_duration: 1.0,
            naming: SliceNaming::default(),
        }
    }
}

impl SliceSettings {
    /// Reject slice durations that cannot produce a finite slice count
    pub fn validate(&self) -> Result<()> {
        if !self.slice_duration.is_finite() || self.slice_duration <= 0.0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "slice duration must be a positive number of seconds, got {}",
                self.slice_duration
            )));
        }
        Ok(())
    }
}

/// Everything a decoder needs to decompose one video
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub video_path: &'a Path,
    /// Existing, per-video frame directory
    pub frames_dir: &'a Path,
    /// Existing, per-video audio directory
    pub audio_dir: &'a Path,
    pub slice_duration: f64,
    pub naming: &'a SliceNaming,
}

/// External decode mechanism: writes frame images and audio segments to disk
pub trait Decoder: Send + Sync {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<()>;
}

/// Output directories of one decomposed video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedVideo {
    /// Video name (file stem)
    pub name: String,
    pub source: PathBuf,
    pub frames_dir: PathBuf,
    pub audio_dir: PathBuf,
}

/// Result of decomposing one input video
#[derive(Debug)]
pub struct DecomposeOutcome {
    pub video_path: PathBuf,
    pub result: Result<DecomposedVideo>,
}

/// Video name used for output directories and slice identifiers
pub fn video_name(video_path: &Path) -> Result<String> {
    video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ProcessingError::InvalidConfig(format!(
                "cannot derive a video name from {}",
                video_path.display()
            ))
        })
}

/// Number of slices for a video of `duration` seconds.
///
/// A trailing partial slice counts as a slice; a small tolerance absorbs
/// container durations such as `5.000000001`.
#[must_use]
pub fn expected_slice_count(duration: f64, slice_duration: f64) -> u32 {
    if !duration.is_finite() || duration <= 0.0 || slice_duration <= 0.0 {
        return 0;
    }
    ((duration / slice_duration) - 1e-6).ceil().max(0.0) as u32
}

/// List videos in `dir` with one of `extensions` (case-insensitive), sorted by
/// video name (the file stem) and then by full file name. This is the order
/// of the per-video output directories, so a dataset assembled from an
/// existing decomposition matches a full build. When two videos share a
/// stem, only the first is kept because their output directories would
/// collide.
pub fn discover_videos(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .collect();

    videos.sort_by(|a, b| {
        a.file_stem()
            .cmp(&b.file_stem())
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });

    let mut seen = HashSet::with_capacity(videos.len());
    videos.retain(|path| match video_name(path) {
        Ok(name) if seen.insert(name.clone()) => true,
        Ok(name) => {
            warn!(
                "Skipping {}: another video already uses the name '{}'",
                path.display(),
                name
            );
            false
        }
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            false
        }
    });

    if videos.is_empty() {
        return Err(ProcessingError::NoVideosFound(dir.to_path_buf()));
    }

    debug!("Discovered {} videos in {}", videos.len(), dir.display());
    Ok(videos)
}

/// Remove slice files left in `dir` by an earlier run. Other files are kept.
pub fn clear_stale_slices(dir: &Path, naming: &SliceNaming) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_slice = entry
            .file_name()
            .to_str()
            .map(|name| naming.is_slice_file(name))
            .unwrap_or(false);
        if is_slice && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove audio segments numbered past `slice_count`.
///
/// The segment muxer can emit a sliver segment when the audio track runs a
/// few milliseconds longer than the container duration (encoder priming).
pub(crate) fn trim_tail_segments(dir: &Path, naming: &SliceNaming, slice_count: u32) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let past_tail = entry
            .file_name()
            .to_str()
            .and_then(|name| naming.parse_audio_index(name))
            .map(|index| index > slice_count)
            .unwrap_or(false);
        if past_tail {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Decompose one video into `<frames_root>/<stem>` and `<audio_root>/<stem>`.
///
/// Directory creation is idempotent. Any decoder failure is reported as a
/// [`ProcessingError::DecodeFailure`] for this video only.
pub fn decompose(
    decoder: &dyn Decoder,
    video_path: &Path,
    frames_root: &Path,
    audio_root: &Path,
    settings: &SliceSettings,
) -> Result<DecomposedVideo> {
    settings.validate()?;
    let name = video_name(video_path)?;

    let frames_dir = frames_root.join(&name);
    let audio_dir = audio_root.join(&name);
    std::fs::create_dir_all(&frames_dir)?;
    std::fs::create_dir_all(&audio_dir)?;

    let stale = clear_stale_slices(&frames_dir, &settings.naming)?
        + clear_stale_slices(&audio_dir, &settings.naming)?;
    if stale > 0 {
        debug!("{}: removed {} slice files from a previous run", name, stale);
    }

    let request = DecodeRequest {
        video_path,
        frames_dir: &frames_dir,
        audio_dir: &audio_dir,
        slice_duration: settings.slice_duration,
        naming: &settings.naming,
    };
    decoder
        .decode(&request)
        .map_err(|e| ProcessingError::decode(&name, e))?;

    info!("Frames and audio extracted for {}", name);

    Ok(DecomposedVideo {
        name,
        source: video_path.to_path_buf(),
        frames_dir,
        audio_dir,
    })
}

/// Decompose every video, on `jobs` threads when `jobs > 1`.
///
/// Outcomes come back in input order regardless of completion order.
pub fn decompose_all(
    decoder: &dyn Decoder,
    videos: &[PathBuf],
    frames_root: &Path,
    audio_root: &Path,
    settings: &SliceSettings,
    jobs: usize,
) -> Result<Vec<DecomposeOutcome>> {
    settings.validate()?;

    let run_one = |video_path: &PathBuf| DecomposeOutcome {
        video_path: video_path.clone(),
        result: decompose(decoder, video_path, frames_root, audio_root, settings),
    };

    if jobs <= 1 || videos.len() <= 1 {
        return Ok(videos.iter().map(run_one).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("decompose-{i}"))
        .build()
        .map_err(|e| ProcessingError::Other(format!("Failed to build decode pool: {e}")))?;

    Ok(pool.install(|| videos.par_iter().map(run_one).collect()))
}
