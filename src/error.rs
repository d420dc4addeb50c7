//! Error types for the mistral-ocr library.
//!
//! [`OcrError`] is the single error type returned by the client, the
//! materializer and the batch processor. Variants are grouped by where the
//! failure happens:
//!
//! * **Config / input**: an empty credential list, a missing or oversized file.
//!   Reported before any request leaves the machine.
//! * **Remote**: transport failures, non-success HTTP statuses and payload
//!   decode failures. Every one names the [`Operation`] that failed.
//! * **Output**: failures writing the artifact set to disk.
//! * **Batch**: aggregate outcomes of a multi-file run.
//!
//! Per-image decode failures during materialization are *not* errors: they
//! are logged and the image is skipped.

use crate::output::ProcessResult;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The remote call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Multipart `POST <endpoint>files`.
    Upload,
    /// `GET <endpoint>files/<id>/url?expiry=24`.
    SignedUrl,
    /// JSON `POST <endpoint>ocr`.
    Ocr,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Upload => "file upload",
            Operation::SignedUrl => "signed URL fetch",
            Operation::Ocr => "OCR request",
        };
        f.write_str(name)
    }
}

/// Pipeline step used as context when an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Upload,
    SignedUrl,
    Ocr,
    Save,
    ReadInput,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Upload => "uploading the document",
            Step::SignedUrl => "fetching the signed URL",
            Step::Ocr => "running OCR",
            Step::Save => "saving results",
            Step::ReadInput => "reading the input",
        };
        f.write_str(name)
    }
}

/// All errors returned by the mistral-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// File exceeds the upload limit; checked before any network call.
    #[error("File '{path}' is {size_mb:.2} MB, larger than the {limit_mb:.0} MB upload limit")]
    FileTooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: f64,
    },

    /// The document URL could not be parsed.
    #[error("Invalid document URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Remote errors ─────────────────────────────────────────────────────
    /// Connection failure, timeout, or a broken response body.
    #[error("{operation} failed in transport: {detail}")]
    Transport { operation: Operation, detail: String },

    /// The service answered with a non-success status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    HttpStatus {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// A 200 response whose body did not match the expected shape.
    #[error("{operation} returned a payload that could not be decoded")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    /// A saved JSON file matched neither the response nor the metadata shape.
    #[error("'{path}' is not a recognised OCR response or metadata file: {detail}")]
    UnrecognizedResponse { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading an input or creating a directory failed.
    #[error("I/O error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write one of the output artifacts.
    #[error("Failed to write output file '{path}'")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline context ──────────────────────────────────────────────────
    /// An item failed at a given step; wraps the underlying cause.
    #[error("Failed {step} for '{item}'")]
    Step {
        step: Step,
        item: String,
        #[source]
        source: Box<OcrError>,
    },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Nothing in the input list was a processable document.
    #[error("No PDF files found to process ({errors} input errors)")]
    NoInputFiles { errors: usize },

    /// Every collected item failed.
    #[error("All {failed} files failed to process")]
    AllItemsFailed { failed: usize },

    /// The batch stopped at the first failure (continue-on-error disabled).
    ///
    /// `completed` holds the results accumulated before the failure.
    #[error("Batch aborted at '{path}' after {} completed files", completed.len())]
    BatchAborted {
        path: PathBuf,
        completed: Vec<ProcessResult>,
        #[source]
        source: Box<OcrError>,
    },
}

impl OcrError {
    /// Wrap `self` with the pipeline step and item it belongs to.
    pub fn at(self, step: Step, item: impl Into<String>) -> Self {
        OcrError::Step {
            step,
            item: item.into(),
            source: Box::new(self),
        }
    }

    /// This error and every cause below it on one line, joined with `: `.
    ///
    /// Display shows only the outermost message; use this for log lines and
    /// progress output where no error-chain printer is involved.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }

    /// HTTP status carried by this error (looking through step context).
    pub fn status(&self) -> Option<u16> {
        match self {
            OcrError::HttpStatus { status, .. } => Some(*status),
            OcrError::Step { source, .. } => source.status(),
            _ => None,
        }
    }

    /// 401/403 from the service.
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Transport failures and 503/504 responses.
    pub fn is_transient(&self) -> bool {
        match self {
            OcrError::Transport { .. } => true,
            OcrError::Step { source, .. } => source.is_transient(),
            other => matches!(other.status(), Some(503 | 504)),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OcrError::Io {
            path: path.into(),
            source,
        }
    }
}
