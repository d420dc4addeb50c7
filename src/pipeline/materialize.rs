//! Result materialization: OCR response → files on disk.
//!
//! ```text
//! <output_dir>/
//!   images/<id>[.<ext>]   decoded images (only when images are included)
//!   metadata.json         run record, best-effort
//!   output.txt            plain text
//!   output.md             combined Markdown, written last via temp + rename
//! ```
//!
//! `output.md` is the completion marker for [`already_done`]: it only
//! appears, non-empty, after every other artifact has been written.

use crate::error::OcrError;
use crate::output::{ProcessMetadata, IMAGES_DIR, MARKDOWN_FILE, METADATA_FILE, TEXT_FILE};
use crate::pipeline::images::{decode_payload, image_filename};
use crate::pipeline::markdown::render_document;
use crate::response::OcrResponse;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Paths and counts produced by [`materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub output_dir: PathBuf,
    /// `<output_dir>/images`, or `output_dir` itself when images are excluded.
    pub images_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub pages: usize,
    pub images_saved: usize,
}

/// Images written for one response.
#[derive(Debug, Default)]
pub struct SavedImages {
    /// Image identifier → `images/<filename>`.
    pub paths: HashMap<String, String>,
    pub count: usize,
}

/// `true` when `output_dir/output.md` exists and is non-empty.
pub async fn already_done(output_dir: &Path) -> bool {
    match tokio::fs::metadata(output_dir.join(MARKDOWN_FILE)).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Write the full artifact set for `response` into `output_dir`.
///
/// Fills in the output-related fields of `metadata` before persisting it.
/// Per-image failures are logged and skipped; so is a metadata write failure.
pub async fn materialize(
    response: &OcrResponse,
    output_dir: &Path,
    metadata: &mut ProcessMetadata,
    include_images: bool,
) -> Result<Artifacts, OcrError> {
    create_dir(output_dir).await?;

    let (images_dir, saved) = if include_images {
        let dir = output_dir.join(IMAGES_DIR);
        create_dir(&dir).await?;
        let saved = save_images(response, &dir).await;
        (dir, saved)
    } else {
        (output_dir.to_path_buf(), SavedImages::default())
    };

    metadata.output_dir = output_dir.to_path_buf();
    metadata.pages_processed = response.pages.len();
    metadata.images_saved = saved.count;
    metadata.ocr_response_info = response_summary(response);

    let doc = render_document(&response.pages, &saved.paths, include_images);

    let metadata_path = output_dir.join(METADATA_FILE);
    write_metadata(&metadata_path, metadata).await;

    let text_path = output_dir.join(TEXT_FILE);
    tokio::fs::write(&text_path, &doc.text)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: text_path.clone(),
            source: e,
        })?;

    write_atomic(&output_dir.join(MARKDOWN_FILE), &doc.markdown).await?;

    info!(
        output = %output_dir.display(),
        pages = response.pages.len(),
        images = saved.count,
        "Saved OCR results"
    );

    Ok(Artifacts {
        output_dir: output_dir.to_path_buf(),
        images_dir,
        metadata_path,
        pages: response.pages.len(),
        images_saved: saved.count,
    })
}

/// Decode and write every image, in page order then per-page order.
pub async fn save_images(response: &OcrResponse, images_dir: &Path) -> SavedImages {
    let mut saved = SavedImages::default();

    for page in &response.pages {
        for img in &page.images {
            let bytes = match decode_payload(img.image_base64.as_deref().unwrap_or_default()) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!(image = %img.id, page = page.index, "Skipping undecodable image: {}", e);
                    continue;
                }
            };

            let filename = image_filename(&img.id, &bytes);
            let path = images_dir.join(&filename);
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                warn!(image = %img.id, path = %path.display(), "Failed to write image: {}", e);
                continue;
            }

            debug!(image = %img.id, path = %path.display(), bytes = bytes.len(), "Saved image");
            saved
                .paths
                .insert(img.id.clone(), format!("{IMAGES_DIR}/{filename}"));
            saved.count += 1;
        }
    }

    saved
}

/// Summary stored under `ocr_response_info` in `metadata.json`.
pub fn response_summary(response: &OcrResponse) -> BTreeMap<String, serde_json::Value> {
    let mut info = BTreeMap::new();
    info.insert("model".to_string(), json!(response.model));
    info.insert(
        "pages_processed".to_string(),
        json!(response.usage_info.pages_processed),
    );
    if let Some(size) = response.usage_info.doc_size_bytes {
        info.insert("doc_size_bytes".to_string(), json!(size));
    }
    info
}

async fn write_metadata(path: &Path, metadata: &ProcessMetadata) {
    let body = match serde_json::to_vec_pretty(metadata) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to serialise metadata: {}", e);
            return;
        }
    };
    match tokio::fs::write(path, body).await {
        Ok(()) => debug!(path = %path.display(), "Saved metadata"),
        Err(e) => warn!(path = %path.display(), "Failed to write metadata: {}", e),
    }
}

/// Write via a sibling temp file and rename, so `path` is never partial.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), OcrError> {
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn create_dir(dir: &Path) -> Result<(), OcrError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SourceKind;
    use crate::response::{Image, Page, UsageInfo};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn image(id: &str, payload: Option<&str>) -> Image {
        Image {
            id: id.to_string(),
            image_base64: payload.map(str::to_string),
            ..Default::default()
        }
    }

    fn response(pages: Vec<Page>) -> OcrResponse {
        OcrResponse {
            pages,
            model: "mistral-ocr-2503".into(),
            usage_info: UsageInfo {
                pages_processed: 2,
                doc_size_bytes: Some(1234),
            },
        }
    }

    fn sample() -> OcrResponse {
        let jpeg_like = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"\xff\xd8\xff\xe0rest"));
        response(vec![
            Page {
                index: 0,
                markdown: "A![x](x)".into(),
                images: vec![image("x", Some(jpeg_like.as_str()))],
                dimensions: None,
            },
            Page {
                index: 1,
                markdown: "B".into(),
                ..Default::default()
            },
        ])
    }

    #[tokio::test]
    async fn writes_full_artifact_set() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("doc");
        let mut meta = ProcessMetadata::new(SourceKind::File, "doc.pdf", true);

        let artifacts = materialize(&sample(), &out, &mut meta, true).await.unwrap();

        assert_eq!(artifacts.pages, 2);
        assert_eq!(artifacts.images_saved, 1);
        assert_eq!(artifacts.images_dir, out.join("images"));

        let md = std::fs::read_to_string(out.join("output.md")).unwrap();
        assert_eq!(md, "A![x](images/x.jpeg)\n\nB\n\n");
        let txt = std::fs::read_to_string(out.join("output.txt")).unwrap();
        assert_eq!(txt, "A\n\nB\n\n");
        assert_eq!(
            std::fs::read(out.join("images/x.jpeg")).unwrap(),
            b"\xff\xd8\xff\xe0rest"
        );
        assert!(!out.join("output.md.tmp").exists());

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&artifacts.metadata_path).unwrap()).unwrap();
        assert_eq!(saved["images_saved"], 1);
        assert_eq!(saved["pages_processed"], 2);
        assert_eq!(saved["ocr_response_info"]["model"], "mistral-ocr-2503");
        assert_eq!(saved["ocr_response_info"]["doc_size_bytes"], 1234);
    }

    #[tokio::test]
    async fn bad_image_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = response(vec![Page {
            index: 0,
            markdown: "![bad](bad) ![none](none) ![dots](dots)".into(),
            images: vec![
                image("bad", Some("%%%not-base64%%%")),
                image("none", None),
                image("dots", Some("...")),
            ],
            dimensions: None,
        }]);
        let mut meta = ProcessMetadata::new(SourceKind::Url, "https://x/doc.pdf", true);

        let artifacts = materialize(&resp, tmp.path(), &mut meta, true).await.unwrap();

        assert_eq!(artifacts.images_saved, 0);
        assert_eq!(meta.images_saved, 0);
        let md = std::fs::read_to_string(tmp.path().join("output.md")).unwrap();
        assert_eq!(md, "![bad](bad) ![none](none) ![dots](dots)\n\n");
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn images_excluded_writes_no_image_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut meta = ProcessMetadata::new(SourceKind::File, "doc.pdf", false);

        let artifacts = materialize(&sample(), tmp.path(), &mut meta, false).await.unwrap();

        assert_eq!(artifacts.images_dir, tmp.path());
        assert!(!tmp.path().join("images").exists());
        let md = std::fs::read_to_string(tmp.path().join("output.md")).unwrap();
        assert_eq!(md, "A![x](x)\n\nB\n\n");
    }

    #[tokio::test]
    async fn already_done_requires_non_empty_markdown() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!already_done(tmp.path()).await);

        std::fs::write(tmp.path().join("output.md"), "").unwrap();
        assert!(!already_done(tmp.path()).await);

        std::fs::write(tmp.path().join("output.md"), "done").unwrap();
        assert!(already_done(tmp.path()).await);
    }

    #[test]
    fn summary_omits_missing_doc_size() {
        let mut resp = sample();
        resp.usage_info.doc_size_bytes = None;
        let info = response_summary(&resp);
        assert_eq!(info.len(), 2);
        assert!(!info.contains_key("doc_size_bytes"));
    }
}
