//! Caption-based frame renaming
//!
//! Renames each captioned frame of a persisted dataset after its caption and
//! rewrites the artifact so `frame_path` follows the file. Slice ids do not
//! depend on the file name and are left untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use task_dataset_common::Result;
use tracing::{debug, info, warn};

use crate::assembler::{persist, Dataset};

/// Longest file stem produced from a caption, in characters
const MAX_STEM_CHARS: usize = 120;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("Invalid non-word regex"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("Invalid separator regex"));

/// Outcome of a rename pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub renamed: usize,
    /// Entries with a null caption or a caption with no usable characters
    pub skipped: usize,
    /// Entries whose frame file no longer exists
    pub missing: usize,
}

/// Turn a caption into a file stem: lowercase, punctuation dropped, runs of
/// whitespace and hyphens collapsed to `_`
#[must_use]
pub fn clean_caption_for_filename(caption: &str) -> String {
    let lower = caption.trim().to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, "");
    let joined = SEPARATORS.replace_all(stripped.trim(), "_");
    joined.chars().take(MAX_STEM_CHARS).collect()
}

/// Rename the frames referenced by `dataset` in place and update their paths
pub fn rename_frames(dataset: &mut Dataset) -> RenameReport {
    let mut report = RenameReport::default();
    let mut taken: HashSet<PathBuf> = HashSet::new();

    for entry in &mut dataset.entries {
        let Some(caption) = entry.caption.as_deref() else {
            report.skipped += 1;
            continue;
        };
        let stem = clean_caption_for_filename(caption);
        if stem.is_empty() {
            debug!("{}: caption {:?} yields no file name", entry.slice_id, caption);
            report.skipped += 1;
            continue;
        }

        let current = PathBuf::from(&entry.frame_path);
        if !current.is_file() {
            warn!("Frame {} not found; leaving entry unchanged", current.display());
            report.missing += 1;
            continue;
        }

        let target = free_target(&current, &stem, &taken);
        if target != current {
            if let Err(e) = std::fs::rename(&current, &target) {
                warn!(
                    "Failed to rename {} to {}: {}",
                    current.display(),
                    target.display(),
                    e
                );
                report.missing += 1;
                continue;
            }
            entry.frame_path = target.display().to_string();
        }
        taken.insert(target);
        report.renamed += 1;
    }

    report
}

/// Load the artifact at `path`, rename its frames, and atomically rewrite it
pub fn rename_dataset(path: &Path) -> Result<RenameReport> {
    let mut dataset = Dataset::load(path)?;
    let report = rename_frames(&mut dataset);
    persist(&dataset, path)?;

    info!(
        "Renamed {} frames ({} skipped, {} missing)",
        report.renamed, report.skipped, report.missing
    );
    Ok(report)
}

/// `<dir>/<stem>.<ext>`, or `<stem>_2`, `<stem>_3`... when taken by another frame
fn free_target(current: &Path, stem: &str, taken: &HashSet<PathBuf>) -> PathBuf {
    let dir = current.parent().unwrap_or_else(|| Path::new(""));
    let extension = current
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let mut suffix = 1;
    loop {
        let name = if suffix == 1 {
            format!("{stem}{extension}")
        } else {
            format!("{stem}_{suffix}{extension}")
        };
        let candidate = dir.join(name);
        if !taken.contains(&candidate) && (candidate == current || !candidate.exists()) {
            return candidate;
        }
        suffix += 1;
    }
}
