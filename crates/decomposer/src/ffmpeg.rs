//! `FFmpeg` CLI decode backend
//!
//! Frames are sampled with the `fps` filter (one frame per slice) and capped at
//! the expected slice count. Audio is cut with the `segment` muxer into
//! slice-length files. Both outputs are numbered from the first slice index so
//! frame N and audio segment N cover the same time window.

use crate::audio::AudioSettings;
use crate::{expected_slice_count, trim_tail_segments, video_name, DecodeRequest, Decoder};
use std::path::{Path, PathBuf};
use std::process::Command;
use task_dataset_common::{ProcessingError, Result, FIRST_SLICE_INDEX};
use tracing::{debug, info, warn};

/// Decoder backed by the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    /// Encoding of the audio segments
    pub audio: AudioSettings,
    /// JPEG quality scale passed as `-q:v` (2 = high quality)
    pub jpeg_quality: u8,
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new(AudioSettings::default())
    }
}

impl FfmpegDecoder {
    pub fn new(audio: AudioSettings) -> Self {
        Self {
            audio,
            jpeg_quality: 2,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }

    /// Use specific `ffmpeg`/`ffprobe` binaries instead of the ones on `PATH`
    #[must_use]
    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg_bin = ffmpeg.into();
        self.ffprobe_bin = ffprobe.into();
        self
    }

    /// Container duration in seconds
    pub fn probe_duration(&self, video_path: &Path) -> Result<f64> {
        let stdout = self.run_ffprobe(
            video_path,
            &[
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
        )?;

        let value = stdout.trim();
        value.parse::<f64>().map_err(|_| {
            ProcessingError::FFmpegError(format!(
                "ffprobe reported no usable duration for {}: {:?}",
                video_path.display(),
                value
            ))
        })
    }

    /// Whether the file carries at least one audio stream
    pub fn has_audio_stream(&self, video_path: &Path) -> Result<bool> {
        let stdout = self.run_ffprobe(
            video_path,
            &[
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=codec_type",
                "-of",
                "csv=p=0",
            ],
        )?;
        Ok(!stdout.trim().is_empty())
    }

    /// Extract the whole audio track of `video_path` into `output_dir/<stem>.<ext>`
    pub fn extract_full_audio(&self, video_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        if !self.has_audio_stream(video_path)? {
            return Err(ProcessingError::NoAudioStream);
        }

        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir
            .join(video_name(video_path)?)
            .with_extension(self.audio.format.extension());

        let mut cmd = self.ffmpeg_command(video_path);
        cmd.args(self.audio.encoder_args()).arg(&output_path);
        run(cmd)?;

        if !output_path.exists() {
            return Err(ProcessingError::FFmpegError(
                "Output file was not created".to_string(),
            ));
        }

        info!(
            "Extracted audio from {} to {}",
            video_path.display(),
            output_path.display()
        );
        Ok(output_path)
    }

    fn extract_frames(&self, request: &DecodeRequest<'_>, slice_count: u32) -> Result<()> {
        let pattern = request.frames_dir.join(request.naming.frame_pattern());

        let mut cmd = self.ffmpeg_command(request.video_path);
        cmd.arg("-an")
            .arg("-vf")
            .arg(format!("fps={}", fps_expression(request.slice_duration)))
            .arg("-frames:v")
            .arg(slice_count.to_string())
            .arg("-start_number")
            .arg(FIRST_SLICE_INDEX.to_string())
            .arg("-q:v")
            .arg(self.jpeg_quality.to_string())
            .arg(pattern);
        run(cmd)
    }

    fn extract_audio_segments(&self, request: &DecodeRequest<'_>) -> Result<()> {
        let pattern = request.audio_dir.join(request.naming.audio_pattern());

        let mut cmd = self.ffmpeg_command(request.video_path);
        cmd.args(self.audio.encoder_args())
            .arg("-f")
            .arg("segment")
            .arg("-segment_time")
            .arg(request.slice_duration.to_string())
            .arg("-segment_start_number")
            .arg(FIRST_SLICE_INDEX.to_string())
            .arg("-reset_timestamps")
            .arg("1")
            .arg(pattern);
        run(cmd)
    }

    fn ffmpeg_command(&self, input: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input);
        cmd
    }

    fn run_ffprobe(&self, video_path: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.ffprobe_bin)
            .args(["-v", "error"])
            .args(args)
            .arg(video_path)
            .output()
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessingError::FFmpegError(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Decoder for FfmpegDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<()> {
        let duration = self.probe_duration(request.video_path)?;
        let slice_count = expected_slice_count(duration, request.slice_duration);
        if slice_count == 0 {
            return Err(ProcessingError::CorruptedFile(format!(
                "{} has zero duration",
                request.video_path.display()
            )));
        }

        debug!(
            "{}: duration {:.3}s -> {} slices of {}s",
            request.video_path.display(),
            duration,
            slice_count,
            request.slice_duration
        );

        self.extract_frames(request, slice_count)?;

        if self.has_audio_stream(request.video_path)? {
            self.extract_audio_segments(request)?;
            let trimmed = trim_tail_segments(request.audio_dir, request.naming, slice_count)?;
            if trimmed > 0 {
                debug!(
                    "{}: dropped {} audio segments past slice {}",
                    request.video_path.display(),
                    trimmed,
                    slice_count
                );
            }
        } else {
            warn!(
                "{} has no audio stream; its frames will have no matching audio",
                request.video_path.display()
            );
        }

        Ok(())
    }
}

/// Value for the `fps` filter that yields one frame per slice. Uses the
/// same decimal as `-segment_time` so frames stay on the audio boundaries.
fn fps_expression(slice_duration: f64) -> String {
    format!("1/{slice_duration}")
}

fn run(mut cmd: Command) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute FFmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessingError::FFmpegError(format!(
            "FFmpeg failed: {}",
            stderr.trim()
        )));
    }

    Ok(())
}
