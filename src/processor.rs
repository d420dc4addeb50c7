//! Per-item pipelines and batch orchestration.
//!
//! [`OcrProcessor`] runs the file pipeline (skip check → upload → signed URL
//! → OCR → materialize), the URL pipeline (OCR → materialize) and batches of
//! files, one item at a time. [`convert_json`] re-materializes a saved
//! response without touching the network.

use crate::config::{OcrConfig, ProcessOptions};
use crate::error::{OcrError, Step};
use crate::output::{ProcessMetadata, ProcessResult, SourceKind};
use crate::pipeline::client::{OcrBackend, OcrClient};
use crate::pipeline::input::{collect_pdf_files, file_stem, item_output_name, url_output_name};
use crate::pipeline::materialize::{already_done, materialize};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::response::{OcrResponse, RawOcrResponse, RawResponseEnvelope};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// An item that failed during a batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: OcrError,
}

/// Outcome of [`OcrProcessor::process_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Results in processing order, including items skipped as already done.
    pub results: Vec<ProcessResult>,
    /// Items (and unreadable inputs) that failed.
    pub failures: Vec<BatchFailure>,
    /// Number of documents collected from the inputs.
    pub total: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    /// Results that were already done and made no remote calls.
    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.was_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Runs OCR pipelines against an [`OcrBackend`].
pub struct OcrProcessor {
    backend: Arc<dyn OcrBackend>,
    options: ProcessOptions,
    progress: ProgressCallback,
}

impl OcrProcessor {
    /// Build a processor backed by the HTTP client.
    pub fn new(config: &OcrConfig, options: ProcessOptions) -> Result<Self, OcrError> {
        let client = OcrClient::new(config)?;
        Ok(Self::with_backend(Arc::new(client), options))
    }

    /// Build a processor over any backend.
    pub fn with_backend(backend: Arc<dyn OcrBackend>, options: ProcessOptions) -> Self {
        Self {
            backend,
            options,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Process one local document.
    ///
    /// The output directory is named after the custom name, or the file stem.
    pub async fn process_file(&self, path: &Path) -> Result<ProcessResult, OcrError> {
        let name = item_output_name(path, self.options.output_name(), 0, 1);
        self.process_file_as(path, &name).await
    }

    /// Process one local document into `<output_dir>/<name>`.
    pub async fn process_file_as(&self, path: &Path, name: &str) -> Result<ProcessResult, OcrError> {
        let started = Instant::now();
        let item = path.display().to_string();
        let output_dir = self.options.output_dir.join(name);

        if already_done(&output_dir).await {
            info!(
                path = %item,
                output = %output_dir.display(),
                "Output already exists, skipping"
            );
            return Ok(ProcessResult::skipped(output_dir));
        }

        info!(path = %item, "Processing file");
        let include_images = self.options.include_images;

        // The uploading credential owns the file: sign and OCR with it.
        let uploaded = self
            .backend
            .upload_file(path)
            .await
            .map_err(|e| e.at(Step::Upload, &item))?;
        let document_url = self
            .backend
            .signed_url(&uploaded)
            .await
            .map_err(|e| e.at(Step::SignedUrl, &item))?;
        let raw = self
            .backend
            .run_ocr(&document_url, include_images, Some(uploaded.credential.as_str()))
            .await
            .map_err(|e| e.at(Step::Ocr, &item))?;

        let mut metadata = ProcessMetadata::new(SourceKind::File, &item, include_images);
        metadata.document_url = document_url;
        metadata.file_id = Some(uploaded.id);

        finish(raw, &output_dir, metadata, include_images, started)
            .await
            .map_err(|e| e.at(Step::Save, &item))
    }

    /// Run OCR directly on a document URL. No skip check applies.
    pub async fn process_url(&self, url: &str) -> Result<ProcessResult, OcrError> {
        let started = Instant::now();
        info!(url, "Processing URL");

        let include_images = self.options.include_images;
        let raw = self
            .backend
            .run_ocr(url, include_images, None)
            .await
            .map_err(|e| e.at(Step::Ocr, url))?;

        let now = Utc::now().timestamp().max(0) as u64;
        let name = url_output_name(self.options.output_name(), now);
        let output_dir = self.options.output_dir.join(name);

        let mut metadata = ProcessMetadata::new(SourceKind::Url, url, include_images);
        metadata.document_url = url.to_string();

        finish(raw, &output_dir, metadata, include_images, started)
            .await
            .map_err(|e| e.at(Step::Save, url))
    }

    /// Re-materialize a saved response; see [`convert_json`].
    pub async fn convert_json(&self, path: &Path) -> Result<ProcessResult, OcrError> {
        convert_json(path, &self.options).await
    }

    /// Expand `inputs` and process every document, one at a time.
    ///
    /// With `continue_on_error` a failed item is recorded and the batch moves
    /// on; otherwise the first failure returns [`OcrError::BatchAborted`]
    /// carrying the results so far.
    pub async fn process_batch(&self, inputs: &[PathBuf]) -> Result<BatchReport, OcrError> {
        let collected = collect_pdf_files(inputs);
        let continue_on_error = self.options.continue_on_error;

        let mut report = BatchReport {
            total: collected.files.len(),
            ..Default::default()
        };

        for (path, err) in collected.errors {
            if !continue_on_error {
                return Err(OcrError::BatchAborted {
                    source: Box::new(err.at(Step::ReadInput, path.display().to_string())),
                    path,
                    completed: Vec::new(),
                });
            }
            report.failures.push(BatchFailure { path, error: err });
        }

        if collected.files.is_empty() {
            return Err(OcrError::NoInputFiles {
                errors: report.failures.len(),
            });
        }

        let total = collected.files.len();
        info!(files = total, "Starting batch");
        self.progress.on_batch_start(total);

        for (index, path) in collected.files.into_iter().enumerate() {
            self.progress.on_item_start(index, total, &path);
            let name = item_output_name(&path, self.options.output_name(), index, total);

            match self.process_file_as(&path, &name).await {
                Ok(result) => {
                    debug!(path = %path.display(), pages = result.pages, "Item complete");
                    self.progress.on_item_complete(index, total, &result);
                    report.results.push(result);
                }
                Err(e) => {
                    let message = e.report();
                    error!(path = %path.display(), "Item failed: {}", message);
                    self.progress.on_item_error(index, total, &message);
                    if !continue_on_error {
                        self.progress.on_batch_complete(total, report.results.len());
                        return Err(OcrError::BatchAborted {
                            path,
                            completed: report.results,
                            source: Box::new(e),
                        });
                    }
                    report.failures.push(BatchFailure { path, error: e });
                }
            }
        }

        self.progress.on_batch_complete(total, report.succeeded());
        info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch complete"
        );

        if report.results.is_empty() {
            return Err(OcrError::AllItemsFailed {
                failed: report.failures.len(),
            });
        }
        Ok(report)
    }
}

/// Re-materialize a previously saved response or metadata file.
///
/// Needs no credentials and makes no remote calls. The output directory is
/// named after the custom name, or the JSON file's stem.
pub async fn convert_json(path: &Path, options: &ProcessOptions) -> Result<ProcessResult, OcrError> {
    let started = Instant::now();
    let item = path.display().to_string();
    info!(path = %item, "Converting saved response");

    let data = tokio::fs::read(path).await.map_err(|e| {
        let err = match e.kind() {
            std::io::ErrorKind::NotFound => OcrError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => OcrError::io(path, e),
        };
        err.at(Step::ReadInput, &item)
    })?;

    let response = parse_saved_response(&data, path)?;
    let name = options
        .output_name()
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(path));
    let output_dir = options.output_dir.join(name);

    let metadata = ProcessMetadata::new(SourceKind::Json, &item, options.include_images);
    let raw = RawOcrResponse {
        response,
        raw: data,
    };
    finish(raw, &output_dir, metadata, options.include_images, started)
        .await
        .map_err(|e| e.at(Step::Save, &item))
}

/// Two-stage parse of a saved JSON file.
///
/// 1. An [`OcrResponse`] with pages is used as-is.
/// 2. Otherwise a `{"raw_response": {...}}` wrapper is tried.
/// 3. A top-level response with no pages is accepted as a last resort.
pub fn parse_saved_response(data: &[u8], path: &Path) -> Result<OcrResponse, OcrError> {
    let primary = serde_json::from_slice::<OcrResponse>(data);
    if let Ok(response) = &primary {
        if !response.pages.is_empty() {
            return Ok(response.clone());
        }
    }

    match serde_json::from_slice::<RawResponseEnvelope>(data) {
        Ok(envelope) => {
            debug!(
                pages = envelope.raw_response.pages.len(),
                "Read pages from nested raw_response"
            );
            Ok(envelope.raw_response)
        }
        Err(fallback) => match primary {
            Ok(response) => Ok(response),
            Err(e) => Err(OcrError::UnrecognizedResponse {
                path: path.to_path_buf(),
                detail: format!("{e}; as metadata wrapper: {fallback}"),
            }),
        },
    }
}

/// Attach the raw response and write the artifact set.
async fn finish(
    raw: RawOcrResponse,
    output_dir: &Path,
    mut metadata: ProcessMetadata,
    include_images: bool,
    started: Instant,
) -> Result<ProcessResult, OcrError> {
    if !metadata.set_raw_response(&raw.raw) {
        warn!("Raw response is not valid JSON; omitting it from metadata");
    }

    let artifacts = materialize(&raw.response, output_dir, &mut metadata, include_images).await?;
    let elapsed = format!("{:.2?}", started.elapsed());
    info!(
        output = %artifacts.output_dir.display(),
        pages = artifacts.pages,
        elapsed = %elapsed,
        "Processing complete"
    );

    Ok(ProcessResult {
        output_dir: artifacts.output_dir,
        images_dir: artifacts.images_dir,
        metadata_path: artifacts.metadata_path,
        pages: artifacts.pages,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_response_with_pages_wins() {
        let data = br#"{"pages": [{"index": 0, "markdown": "top"}],
                        "raw_response": {"pages": [{"index": 0, "markdown": "nested"}]}}"#;
        let r = parse_saved_response(data, Path::new("x.json")).unwrap();
        assert_eq!(r.pages[0].markdown, "top");
    }

    #[test]
    fn metadata_wrapper_falls_back_to_nested_pages() {
        let data = br#"{"source_type": "file", "pages_processed": 1,
                        "raw_response": {"pages": [{"index": 0, "markdown": "nested",
                          "images": [{"id": "img-0.jpeg", "top_left_x": 1}]}],
                          "model": "m"}}"#;
        let r = parse_saved_response(data, Path::new("metadata.json")).unwrap();
        assert_eq!(r.pages.len(), 1);
        assert_eq!(r.pages[0].markdown, "nested");
        assert_eq!(r.pages[0].images[0].id, "img-0.jpeg");
        assert_eq!(r.model, "m");
    }

    #[test]
    fn empty_primary_is_accepted_without_wrapper() {
        let data = br#"{"pages": [], "model": "m"}"#;
        let r = parse_saved_response(data, Path::new("x.json")).unwrap();
        assert!(r.pages.is_empty());
    }

    #[test]
    fn unrelated_json_is_unrecognized() {
        let err = parse_saved_response(br#"{"hello": "world"}"#, Path::new("x.json")).unwrap_err();
        assert!(matches!(err, OcrError::UnrecognizedResponse { .. }));

        let err = parse_saved_response(b"not json", Path::new("x.json")).unwrap_err();
        assert!(matches!(err, OcrError::UnrecognizedResponse { .. }));
    }

    #[test]
    fn report_counts() {
        let mut report = BatchReport::default();
        report.results.push(ProcessResult::skipped("out/a".into()));
        report.results.push(ProcessResult {
            pages: 3,
            ..ProcessResult::skipped("out/b".into())
        });
        report.failures.push(BatchFailure {
            path: "c.pdf".into(),
            error: OcrError::InvalidConfig("x".into()),
        });
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
    }
}
