//! Smoke tests against the real `ffmpeg` binaries
//!
//! Run: cargo test --release --test smoke_test -- --ignored --test-threads=1
//!
//! Videos are generated with ffmpeg's lavfi sources, so no fixture files are
//! needed. Captions come from an in-process captioner; the ONNX model is
//! covered by the caption crate's own ignored tests.

mod common;

use anyhow::Result;
use common::validators::validate_dataset;
use image::RgbImage;
use robot_task_dataset::common::ProcessingError;
use robot_task_dataset::dataset::{Captioner, CaptionerFactory, DatasetBuilder, PipelineConfig};
use robot_task_dataset::decomposer::FfmpegDecoder;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Captions a frame with its mean brightness bucket
struct BrightnessCaptioner;

impl Captioner for BrightnessCaptioner {
    fn caption(&mut self, image: &RgbImage) -> robot_task_dataset::common::Result<String> {
        if image.width() == 0 {
            return Err(ProcessingError::CaptionFailure("empty frame".into()));
        }
        let sum: u64 = image.pixels().map(|p| u64::from(p[0]) + u64::from(p[1]) + u64::from(p[2])).sum();
        let mean = sum / (u64::from(image.width()) * u64::from(image.height()) * 3);
        Ok(format!("a test pattern of brightness {}", mean / 32))
    }
}

struct BrightnessFactory;

impl CaptionerFactory for BrightnessFactory {
    type Captioner = BrightnessCaptioner;

    fn load(&self, _worker: usize) -> robot_task_dataset::common::Result<BrightnessCaptioner> {
        Ok(BrightnessCaptioner)
    }
}

fn make_video(path: &Path, seconds: u32) {
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "lavfi", "-i"])
        .arg(format!("testsrc=duration={seconds}:size=320x240:rate=25"))
        .args(["-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:duration={seconds}"))
        .args(["-shortest", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg(path)
        .status()
        .expect("Failed to execute ffmpeg");
    assert!(status.success(), "ffmpeg could not generate {}", path.display());
}

fn config_for(temp: &TempDir) -> PipelineConfig {
    PipelineConfig {
        videos_dir: temp.path().join("videos"),
        frames_dir: temp.path().join("frames"),
        audio_dir: temp.path().join("audio"),
        output: temp.path().join("dataset.json"),
        workers: 2,
        ..Default::default()
    }
}

#[test]
#[ignore]
fn smoke_two_videos_end_to_end() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config_for(&temp);
    std::fs::create_dir_all(&config.videos_dir)?;
    make_video(&config.videos_dir.join("arm_reach.mp4"), 3);
    make_video(&config.videos_dir.join("arm_wave.mkv"), 2);
    std::fs::write(config.videos_dir.join("corrupted.mp4"), b"not a video")?;
    let output = config.output.clone();

    let mut builder = DatasetBuilder::new(FfmpegDecoder::default(), BrightnessFactory, config)?;
    let summary = builder.run()?;

    assert_eq!(summary.videos_found, 3);
    assert_eq!(summary.videos_failed, 1);
    assert_eq!(summary.entries, 5);
    assert_eq!(summary.captions_failed, 0);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
    let validation = validate_dataset(&json);
    assert!(validation.valid, "{:?}", validation.errors);
    assert!(validation.warnings.is_empty(), "{:?}", validation.warnings);
    assert_eq!(json[0]["slice_id"], "arm_reach/000001");
    assert_eq!(json[3]["slice_id"], "arm_wave/000001");
    Ok(())
}

#[test]
#[ignore]
fn smoke_five_second_video_gives_five_entries() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config_for(&temp);
    std::fs::create_dir_all(&config.videos_dir)?;
    make_video(&config.videos_dir.join("five.mp4"), 5);

    let mut builder = DatasetBuilder::new(FfmpegDecoder::default(), BrightnessFactory, config)?;
    let summary = builder.run()?;

    assert_eq!(summary.pairs, 5);
    assert_eq!(summary.gaps, 0);
    assert_eq!(summary.entries, 5);
    Ok(())
}

#[test]
#[ignore]
fn smoke_video_without_audio_yields_only_gaps() -> Result<()> {
    let temp = TempDir::new()?;
    let config = config_for(&temp);
    std::fs::create_dir_all(&config.videos_dir)?;
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
        .arg("testsrc=duration=2:size=160x120:rate=10")
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(config.videos_dir.join("silent.mp4"))
        .status()?;
    assert!(status.success());

    let mut builder = DatasetBuilder::new(FfmpegDecoder::default(), BrightnessFactory, config)?;
    let summary = builder.run()?;

    assert_eq!(summary.videos_decoded, 1);
    assert_eq!(summary.gaps, 2);
    assert_eq!(summary.entries, 0);
    Ok(())
}
