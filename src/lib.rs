//! # mistral-ocr
//!
//! Batch client for the Mistral OCR API: turns PDFs and document URLs into
//! Markdown, plain text and extracted image files.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inputs (files, directories, URL)
//!  │
//!  ├─ 1. Collect   expand directories to .pdf files, name output dirs
//!  ├─ 2. Skip      output.md already present and non-empty → done
//!  ├─ 3. Upload    multipart POST files           ┐
//!  ├─ 4. Sign      GET files/<id>/url?expiry=24   ├ rotated keys + endpoints,
//!  ├─ 5. OCR       POST ocr                       ┘ retried with backoff
//!  └─ 6. Save      images/*, metadata.json, output.txt, output.md
//! ```
//!
//! Every remote call goes through a resilient executor: transient failures
//! (transport errors, 503, 504) are retried on the same endpoint with
//! exponential backoff and auth failures move to the next endpoint. Uploads
//! draw a fresh credential for every attempt; signing and OCR of an uploaded
//! file reuse the key that uploaded it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mistral_ocr::{OcrConfig, OcrProcessor, ProcessOptions};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .api_keys([std::env::var("MISTRAL_API_KEY")?])
//!         .build()?;
//!     let processor = OcrProcessor::new(&config, ProcessOptions::default())?;
//!
//!     let report = processor
//!         .process_batch(&[PathBuf::from("papers/"), PathBuf::from("scan.pdf")])
//!         .await?;
//!     eprintln!("{} done, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mistral-ocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mistral-ocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod response;
pub mod settings;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{mask_credential, OcrConfig, OcrConfigBuilder, ProcessOptions};
pub use error::{OcrError, Operation, Step};
pub use output::{ProcessMetadata, ProcessResult, SourceKind};
pub use pipeline::client::{OcrBackend, OcrClient, UploadedFile};
pub use pipeline::executor::{ResilientExecutor, RetryPolicy};
pub use processor::{convert_json, BatchFailure, BatchReport, OcrProcessor};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use response::{OcrResponse, Page, RawOcrResponse};
pub use settings::{LogFormat, Settings};
