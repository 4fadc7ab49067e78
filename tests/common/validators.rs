//! Dataset artifact validation
//!
//! Checks that a persisted dataset is structurally correct without comparing
//! against golden files.

#![allow(dead_code)]

use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }
}

/// Validate a dataset artifact:
/// - top level is an array of objects with exactly the four entry fields
/// - `caption` is a string or null, the other fields non-empty strings
/// - `slice_id` is `<video>/<6+ digits>` and indices ascend within a video
/// - referenced files exist (warning only, frames may have been renamed away)
pub fn validate_dataset(output: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let Some(entries) = output.as_array() else {
        result.error("dataset is not a JSON array".to_string());
        return result;
    };

    let mut last: Option<(String, u32)> = None;
    for (i, entry) in entries.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            result.error(format!("entry {i} is not an object"));
            continue;
        };
        if object.len() != 4 {
            result.error(format!("entry {i} has {} fields, expected 4", object.len()));
        }

        for key in ["frame_path", "audio_path", "slice_id"] {
            match object.get(key).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => {}
                _ => result.error(format!("entry {i}: {key} must be a non-empty string")),
            }
        }
        match object.get("caption") {
            Some(Value::String(_)) | Some(Value::Null) => {}
            _ => result.error(format!("entry {i}: caption must be a string or null")),
        }

        for key in ["frame_path", "audio_path"] {
            if let Some(path) = object.get(key).and_then(Value::as_str) {
                if !Path::new(path).exists() {
                    result.warn(format!("entry {i}: {key} {path} does not exist"));
                }
            }
        }

        let Some((video, index)) = object
            .get("slice_id")
            .and_then(Value::as_str)
            .and_then(parse_slice_id)
        else {
            result.error(format!("entry {i}: malformed slice_id"));
            continue;
        };
        if let Some((last_video, last_index)) = &last {
            if *last_video == video && index <= *last_index {
                result.error(format!("entry {i}: slice {index} of {video} out of order"));
            }
        }
        last = Some((video, index));
    }

    result
}

fn parse_slice_id(id: &str) -> Option<(String, u32)> {
    let (video, index) = id.rsplit_once('/')?;
    if video.is_empty() || index.len() < 6 || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((video.to_string(), index.parse().ok()?))
}
