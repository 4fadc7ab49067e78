/// Common types and utilities for the robot task dataset pipeline
pub mod naming;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use naming::{slice_id, SliceNaming, FIRST_SLICE_INDEX, SLICE_INDEX_WIDTH};

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Decode failed for {video}: {reason}")]
    DecodeFailure { video: String, reason: String },

    #[error("No videos found in {0}")]
    NoVideosFound(PathBuf),

    #[error("Caption generation failed: {0}")]
    CaptionFailure(String),

    #[error("Failed to persist dataset to {path}: {reason}")]
    PersistFailure { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("Processing timeout after {0:?}")]
    Timeout(Duration),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ProcessingError {
    /// Wrap any error as a decode failure for `video`
    pub fn decode(video: impl Into<String>, reason: impl ToString) -> Self {
        ProcessingError::DecodeFailure {
            video: video.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap any error as a persist failure for `path`
    pub fn persist(path: &Path, reason: impl ToString) -> Self {
        ProcessingError::PersistFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// A frame matched with the audio segment of the same slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicePair {
    /// Video name (source file stem)
    pub video: String,
    /// 1-based slice index
    pub index: u32,
    pub frame_path: PathBuf,
    pub audio_path: PathBuf,
}

impl SlicePair {
    /// Stable identifier of this slice, independent of the frame filename
    #[must_use]
    pub fn slice_id(&self) -> String {
        slice_id(&self.video, self.index)
    }
}

/// A slice after caption generation. `caption` is `None` when inference failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionedSlice {
    pub pair: SlicePair,
    pub caption: Option<String>,
}

/// One persisted dataset record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub frame_path: String,
    pub audio_path: String,
    pub caption: Option<String>,
    pub slice_id: String,
}

impl From<CaptionedSlice> for DatasetEntry {
    fn from(slice: CaptionedSlice) -> Self {
        Self {
            slice_id: slice.pair.slice_id(),
            frame_path: slice.pair.frame_path.display().to_string(),
            audio_path: slice.pair.audio_path.display().to_string(),
            caption: slice.caption,
        }
    }
}
