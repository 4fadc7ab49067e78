//! Slice file naming scheme shared by the decomposer and the pairer
//!
//! Frames are written as `frame_NNNNNN.<image_ext>` and audio segments as
//! `audio.NNNNNN.<audio_ext>`, zero-padded to [`SLICE_INDEX_WIDTH`] digits and
//! numbered from [`FIRST_SLICE_INDEX`].

use serde::{Deserialize, Serialize};

/// Number of digits in a slice index
pub const SLICE_INDEX_WIDTH: usize = 6;

/// Index of the first slice of every video
pub const FIRST_SLICE_INDEX: u32 = 1;

const FRAME_PREFIX: &str = "frame_";
const AUDIO_PREFIX: &str = "audio.";

/// Stable slice identifier: `<video>/<NNNNNN>`
#[must_use]
pub fn slice_id(video: &str, index: u32) -> String {
    format!("{video}/{index:0width$}", width = SLICE_INDEX_WIDTH)
}

/// File extensions used for frame and audio slice files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceNaming {
    pub image_extension: String,
    pub audio_extension: String,
}

impl Default for SliceNaming {
    fn default() -> Self {
        Self {
            image_extension: "jpg".to_string(),
            audio_extension: "wav".to_string(),
        }
    }
}

impl SliceNaming {
    pub fn new(image_extension: impl Into<String>, audio_extension: impl Into<String>) -> Self {
        Self {
            image_extension: image_extension.into(),
            audio_extension: audio_extension.into(),
        }
    }

    /// `frame_000007.jpg` for index 7
    #[must_use]
    pub fn frame_file_name(&self, index: u32) -> String {
        format!(
            "{FRAME_PREFIX}{index:0width$}.{}",
            self.image_extension,
            width = SLICE_INDEX_WIDTH
        )
    }

    /// `audio.000007.wav` for index 7
    #[must_use]
    pub fn audio_file_name(&self, index: u32) -> String {
        format!(
            "{AUDIO_PREFIX}{index:0width$}.{}",
            self.audio_extension,
            width = SLICE_INDEX_WIDTH
        )
    }

    /// printf-style output pattern handed to ffmpeg for frames
    #[must_use]
    pub fn frame_pattern(&self) -> String {
        format!(
            "{FRAME_PREFIX}%0{SLICE_INDEX_WIDTH}d.{}",
            self.image_extension
        )
    }

    /// printf-style output pattern handed to ffmpeg for audio segments
    #[must_use]
    pub fn audio_pattern(&self) -> String {
        format!(
            "{AUDIO_PREFIX}%0{SLICE_INDEX_WIDTH}d.{}",
            self.audio_extension
        )
    }

    /// Slice index of a frame file name, `None` if it is not a frame
    #[must_use]
    pub fn parse_frame_index(&self, file_name: &str) -> Option<u32> {
        parse_index(file_name, FRAME_PREFIX, &self.image_extension)
    }

    /// Slice index of an audio segment file name, `None` if it is not a segment
    #[must_use]
    pub fn parse_audio_index(&self, file_name: &str) -> Option<u32> {
        parse_index(file_name, AUDIO_PREFIX, &self.audio_extension)
    }

    /// Whether `file_name` is a frame or audio slice written by the decomposer
    #[must_use]
    pub fn is_slice_file(&self, file_name: &str) -> bool {
        self.parse_frame_index(file_name).is_some() || self.parse_audio_index(file_name).is_some()
    }
}

fn parse_index(file_name: &str, prefix: &str, extension: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(prefix)?
        .strip_suffix(extension)?
        .strip_suffix('.')?;

    if digits.len() < SLICE_INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}
