//! Audio output settings for slice segments and full-track extraction

use serde::{Deserialize, Serialize};

/// Audio output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// PCM (uncompressed) WAV - for ML models
    Pcm,
    /// FLAC (lossless compression) - for storage
    Flac,
    /// M4A (AAC compression) - for storage
    M4a,
    /// MP3 (lossy compression) - for compatibility
    Mp3,
}

impl AudioFormat {
    /// Get file extension for this format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Get `FFmpeg` codec name for this format
    #[must_use]
    pub fn codec_name(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "pcm_s16le",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "aac",
            AudioFormat::Mp3 => "libmp3lame",
        }
    }

    /// Bitrate for lossy formats, `None` for PCM/FLAC
    fn bitrate(&self) -> Option<&'static str> {
        match self {
            AudioFormat::M4a | AudioFormat::Mp3 => Some("128k"),
            AudioFormat::Pcm | AudioFormat::Flac => None,
        }
    }
}

/// Audio extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output audio format
    pub format: AudioFormat,
    /// Target sample rate (16000 for ML, 48000 for storage)
    pub sample_rate: u32,
    /// Number of channels (1 for mono, 2 for stereo)
    pub channels: u8,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::Pcm,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl AudioSettings {
    /// Encoder arguments shared by segment and full-track extraction
    pub(crate) fn encoder_args(&self) -> Vec<String> {
        let mut args = vec![
            "-vn".to_string(),
            "-acodec".to_string(),
            self.format.codec_name().to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
        ];
        if let Some(bitrate) = self.format.bitrate() {
            args.push("-b:a".to_string());
            args.push(bitrate.to_string());
        }
        args
    }
}
