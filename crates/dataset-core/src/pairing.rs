//! Frame/audio pairing by slice index

use std::path::{Path, PathBuf};
use task_dataset_common::{ProcessingError, Result, SliceNaming, SlicePair};
use tracing::{debug, warn};

/// Pairs of one video plus the frames that had no matching audio segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingReport {
    /// Pairs in ascending slice index order
    pub pairs: Vec<SlicePair>,
    /// Frames dropped because the audio segment of the same index is missing
    pub gaps: Vec<PathBuf>,
}

impl PairingReport {
    #[must_use]
    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }
}

/// Match every frame in `frames_dir` with the audio segment of the same index
/// in `audio_dir`.
///
/// Only reads the filesystem. A missing `audio_dir` turns every frame into a
/// gap; a missing `frames_dir` is an error.
pub fn pair(
    video: &str,
    frames_dir: &Path,
    audio_dir: &Path,
    naming: &SliceNaming,
) -> Result<PairingReport> {
    let entries = std::fs::read_dir(frames_dir).map_err(|e| {
        ProcessingError::Other(format!(
            "cannot list frames of {video} in {}: {e}",
            frames_dir.display()
        ))
    })?;

    let mut frames: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let index = entry
                .file_name()
                .to_str()
                .and_then(|name| naming.parse_frame_index(name))?;
            Some((index, entry.path()))
        })
        .collect();
    frames.sort();

    let mut report = PairingReport {
        pairs: Vec::with_capacity(frames.len()),
        gaps: Vec::new(),
    };

    for (index, frame_path) in frames {
        let audio_path = audio_dir.join(naming.audio_file_name(index));
        if audio_path.is_file() {
            report.pairs.push(SlicePair {
                video: video.to_string(),
                index,
                frame_path,
                audio_path,
            });
        } else {
            warn!(
                "No audio segment for {} ({} missing)",
                frame_path.display(),
                audio_path.display()
            );
            report.gaps.push(frame_path);
        }
    }

    debug!(
        "{}: {} pairs, {} gaps",
        video,
        report.pairs.len(),
        report.gaps.len()
    );
    Ok(report)
}
