//! Dataset assembly and atomic persistence

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use task_dataset_common::{CaptionedSlice, DatasetEntry, ProcessingError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Captioned slices of one video, in any order
#[derive(Debug, Clone)]
pub struct VideoCaptions {
    pub video: String,
    pub slices: Vec<CaptionedSlice>,
}

/// Ordered dataset: video discovery order, then slice index ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    pub entries: Vec<DatasetEntry>,
}

impl Dataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose caption is null
    #[must_use]
    pub fn missing_captions(&self) -> usize {
        self.entries.iter().filter(|e| e.caption.is_none()).count()
    }

    /// Read a persisted artifact
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            ProcessingError::CorruptedFile(format!("{}: {e}", path.display()))
        })
    }
}

/// Flatten per-video captions into one ordered dataset.
///
/// Video order is kept as given; slices of each video are sorted by index
/// because the executor returns them in completion order.
#[must_use]
pub fn assemble(per_video: Vec<VideoCaptions>) -> Dataset {
    let mut entries = Vec::with_capacity(per_video.iter().map(|v| v.slices.len()).sum());

    for VideoCaptions { video, mut slices } in per_video {
        slices.sort_by_key(|s| s.pair.index);
        debug!("Assembling {} entries for {}", slices.len(), video);
        entries.extend(slices.into_iter().map(DatasetEntry::from));
    }

    Dataset { entries }
}

/// Write `dataset` to `path` as a pretty-printed JSON array.
///
/// The data goes to a temporary file in the destination directory first and
/// is renamed over `path`, so readers never see a partial artifact.
pub fn persist(dataset: &Dataset, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| ProcessingError::persist(path, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ProcessingError::persist(path, e))?;
    serde_json::to_writer_pretty(&mut tmp, dataset).map_err(|e| ProcessingError::persist(path, e))?;
    tmp.write_all(b"\n")
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| ProcessingError::persist(path, e))?;
    tmp.persist(path)
        .map_err(|e| ProcessingError::persist(path, e.error))?;

    info!("Wrote {} entries to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use task_dataset_common::SlicePair;
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

    fn two_videos() -> Vec<VideoCaptions> {
        vec![
            VideoCaptions {
                video: "b_stack".to_string(),
                slices: vec![
                    slice("b_stack", 3, Some("three")),
                    slice("b_stack", 1, Some("one")),
                    slice("b_stack", 2, None),
                ],
            },
            VideoCaptions {
                video: "a_pour".to_string(),
                slices: vec![slice("a_pour", 2, Some("two")), slice("a_pour", 1, Some("one"))],
            },
        ]
    }

    #[test]
    fn test_assemble_orders_by_video_then_index() {
        let dataset = assemble(two_videos());
        let ids: Vec<&str> = dataset.entries.iter().map(|e| e.slice_id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "b_stack/000001",
                "b_stack/000002",
                "b_stack/000003",
                "a_pour/000001",
                "a_pour/000002",
            ]
        );
        assert_eq!(dataset.missing_captions(), 1);
    }

    #[test]
    fn test_persisted_artifact_shape() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/dataset.json");

        persist(&assemble(two_videos()), &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 5);
        for object in array {
            let object = object.as_object().unwrap();
            assert_eq!(object.len(), 4);
            for key in ["frame_path", "audio_path", "slice_id"] {
                assert!(!object[key].as_str().unwrap().is_empty());
            }
            assert!(object["caption"].is_string() || object["caption"].is_null());
        }
    }

    #[test]
    fn test_persist_overwrites_and_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.json");

        persist(&assemble(two_videos()), &path).unwrap();
        persist(&Dataset::default(), &path).unwrap();

        assert!(Dataset::load(&path).unwrap().is_empty());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.json");
        let dataset = assemble(two_videos());

        persist(&dataset, &path).unwrap();
        assert_eq!(Dataset::load(&path).unwrap(), dataset);
    }

    #[test]
    fn test_persist_into_unwritable_location_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = persist(&Dataset::default(), &blocker.join("dataset.json")).unwrap_err();
        assert!(matches!(err, ProcessingError::PersistFailure { .. }));
    }

    #[test]
    fn test_load_corrupted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dataset.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            Dataset::load(&path).unwrap_err(),
            ProcessingError::CorruptedFile(_)
        ));
    }
}
