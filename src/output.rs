//! Per-item results and the persisted `metadata.json` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File name of the combined Markdown document.
pub const MARKDOWN_FILE: &str = "output.md";
/// File name of the derived plain-text document.
pub const TEXT_FILE: &str = "output.txt";
/// File name of the metadata record.
pub const METADATA_FILE: &str = "metadata.json";
/// Subdirectory holding extracted images.
pub const IMAGES_DIR: &str = "images";

/// Outcome of processing one item. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub metadata_path: PathBuf,
    /// Recognised page count; `0` means the item was skipped as already done.
    pub pages: usize,
    /// Wall-clock time spent on the item, human readable.
    pub elapsed: String,
}

impl ProcessResult {
    /// Result for an item whose output already existed.
    pub fn skipped(output_dir: PathBuf) -> Self {
        Self {
            images_dir: output_dir.join(IMAGES_DIR),
            metadata_path: output_dir.join(METADATA_FILE),
            output_dir,
            pages: 0,
            elapsed: "0s".to_string(),
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.pages == 0
    }
}

/// Where the processed document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Url,
    Json,
}

/// Record of one processing run, written as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMetadata {
    pub source_type: SourceKind,
    pub source_path: String,
    pub output_dir: PathBuf,
    pub pages_processed: usize,
    pub processed_at: DateTime<Utc>,
    pub document_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub include_images: bool,
    pub images_saved: usize,
    #[serde(default)]
    pub ocr_response_info: BTreeMap<String, serde_json::Value>,
    /// The untouched response bytes, kept for audit and replay.
    #[serde(default)]
    pub raw_response: Option<Box<RawValue>>,
}

impl ProcessMetadata {
    pub fn new(source_type: SourceKind, source_path: impl Into<String>, include_images: bool) -> Self {
        Self {
            source_type,
            source_path: source_path.into(),
            output_dir: PathBuf::new(),
            pages_processed: 0,
            processed_at: Utc::now(),
            document_url: String::new(),
            file_id: None,
            include_images,
            images_saved: 0,
            ocr_response_info: BTreeMap::new(),
            raw_response: None,
        }
    }

    /// Store the raw response bytes if they are valid JSON.
    ///
    /// Returns `false` (leaving the field empty) otherwise.
    pub fn set_raw_response(&mut self, raw: &[u8]) -> bool {
        match std::str::from_utf8(raw)
            .ok()
            .and_then(|s| RawValue::from_string(s.to_string()).ok())
        {
            Some(v) => {
                self.raw_response = Some(v);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_result_layout() {
        let r = ProcessResult::skipped(PathBuf::from("out/doc"));
        assert!(r.was_skipped());
        assert_eq!(r.images_dir, PathBuf::from("out/doc/images"));
        assert_eq!(r.metadata_path, PathBuf::from("out/doc/metadata.json"));
    }

    #[test]
    fn metadata_serialises_field_names() {
        let mut m = ProcessMetadata::new(SourceKind::File, "a.pdf", true);
        assert!(m.set_raw_response(br#"{"pages":[]}"#));
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["source_type"], "file");
        assert_eq!(v["raw_response"], serde_json::json!({"pages": []}));
        assert!(v.get("file_id").is_none());
        for key in [
            "source_path",
            "output_dir",
            "pages_processed",
            "processed_at",
            "document_url",
            "include_images",
            "images_saved",
            "ocr_response_info",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn invalid_raw_response_is_not_stored() {
        let mut m = ProcessMetadata::new(SourceKind::Url, "https://x", false);
        assert!(!m.set_raw_response(b"not json"));
        assert!(m.raw_response.is_none());
    }
}
