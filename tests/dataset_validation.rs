//! Artifact validation without external tools

mod common;

use common::validators::validate_dataset;
use robot_task_dataset::common::{CaptionedSlice, SlicePair};
use robot_task_dataset::dataset::{assemble, persist, VideoCaptions};
use std::path::PathBuf;
use tempfile::TempDir;

fn slice(video: &str, index: u32, caption: Option<&str>) -> CaptionedSlice {
    CaptionedSlice {
        pair: SlicePair {
            video: video.to_string(),
            index,
            frame_path: PathBuf::from(format!("frames/{video}/frame_{index:06}.jpg")),
            audio_path: PathBuf::from(format!("audio/{video}/audio.{index:06}.wav")),
        },
        caption: caption.map(str::to_string),
    }
}

#[test]
fn test_assembled_dataset_validates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("dataset.json");

    let dataset = assemble(vec![
        VideoCaptions {
            video: "pick".to_string(),
            slices: vec![
                slice("pick", 2, None),
                slice("pick", 3, Some("the arm lifts the cup")),
                slice("pick", 1, Some("the arm reaches for a cup")),
            ],
        },
        VideoCaptions {
            video: "place".to_string(),
            slices: vec![slice("place", 1, Some("a cup on a shelf")), slice("place", 2, None)],
        },
    ]);
    persist(&dataset, &path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let validation = validate_dataset(&json);

    assert!(validation.valid, "{:?}", validation.errors);
    assert_eq!(json.as_array().unwrap().len(), 5);
    // Fixture paths do not exist on disk
    assert_eq!(validation.warnings.len(), 10);
}

#[test]
fn test_validator_rejects_out_of_order_slices() {
    let json = serde_json::json!([
        {"frame_path": "f2", "audio_path": "a2", "caption": null, "slice_id": "v/000002"},
        {"frame_path": "f1", "audio_path": "a1", "caption": "x", "slice_id": "v/000001"},
    ]);
    assert!(!validate_dataset(&json).valid);
}

#[test]
fn test_validator_rejects_extra_fields() {
    let json = serde_json::json!([
        {"frame_path": "f", "audio_path": "a", "caption": 3, "slice_id": "v/000001", "x": 1},
    ]);
    let validation = validate_dataset(&json);
    assert_eq!(validation.errors.len(), 2);
}
