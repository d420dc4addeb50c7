//! HTTP client for the three remote operations.
//!
//! [`OcrBackend`] is the seam the processor talks to; [`OcrClient`] is the
//! real implementation on top of `reqwest`, with every call routed through a
//! [`ResilientExecutor`]. Tests substitute a scripted backend.

use crate::config::{mask_credential, OcrConfig};
use crate::error::{OcrError, Operation};
use crate::pipeline::executor::{Decoded, HttpReply, ResilientExecutor};
use crate::response::{OcrRequest, OcrResponse, RawOcrResponse, SignedUrlResponse, UploadResponse};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Expiry requested for signed document URLs, in hours.
pub const SIGNED_URL_EXPIRY_HOURS: u32 = 24;

/// A file stored by the service and the credential that uploaded it.
///
/// Uploaded files belong to the account behind that credential, so the
/// signed URL and the OCR call for the file must use the same one.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub credential: String,
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("id", &self.id)
            .field("credential", &mask_credential(&self.credential))
            .finish()
    }
}

/// The remote OCR service as seen by the processor.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Upload a local document.
    async fn upload_file(&self, path: &Path) -> Result<UploadedFile, OcrError>;

    /// Obtain a temporary URL for an uploaded file, using its credential.
    async fn signed_url(&self, file: &UploadedFile) -> Result<String, OcrError>;

    /// Run recognition on a document URL.
    ///
    /// `credential` pins every attempt to one key; `None` rotates keys.
    async fn run_ocr(
        &self,
        document_url: &str,
        include_images: bool,
        credential: Option<&str>,
    ) -> Result<RawOcrResponse, OcrError>;
}

/// `reqwest`-based [`OcrBackend`] with credential and endpoint rotation.
#[derive(Debug)]
pub struct OcrClient {
    http: reqwest::Client,
    executor: ResilientExecutor,
    max_upload_bytes: u64,
}

impl OcrClient {
    /// Build a client. Fails without credentials, before any request.
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        config.require_credentials()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OcrError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        info!(
            keys = config.api_keys.len(),
            endpoints = config.base_urls.len(),
            max_retries = config.max_retries,
            "OCR client ready"
        );

        Ok(Self {
            http,
            executor: ResilientExecutor::from_config(config)?,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// Size check against the upload limit; runs before any network call.
    async fn check_upload_size(&self, path: &Path) -> Result<u64, OcrError> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OcrError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => OcrError::io(path, e),
        })?;

        if meta.len() > self.max_upload_bytes {
            return Err(OcrError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: meta.len() as f64 / BYTES_PER_MB,
                limit_mb: self.max_upload_bytes as f64 / BYTES_PER_MB,
            });
        }
        Ok(meta.len())
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn upload_file(&self, path: &Path) -> Result<UploadedFile, OcrError> {
        let size = self.check_upload_size(path).await?;
        // Read once; each attempt rebuilds the form from the start of the buffer.
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OcrError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!(path = %path.display(), bytes = size, "Uploading file");

        let uploaded: Decoded<UploadResponse> = self
            .executor
            .execute_json(Operation::Upload, None, |attempt| {
                let form = Form::new().text("purpose", "ocr").part(
                    "file",
                    Part::bytes(bytes.clone()).file_name(file_name.clone()),
                );
                let request = self
                    .http
                    .post(format!("{}files", attempt.endpoint))
                    .bearer_auth(&attempt.credential)
                    .multipart(form);
                send(Operation::Upload, request)
            })
            .await?;

        debug!(file_id = %uploaded.value.id, "Upload complete");
        Ok(UploadedFile {
            id: uploaded.value.id,
            credential: uploaded.credential,
        })
    }

    async fn signed_url(&self, file: &UploadedFile) -> Result<String, OcrError> {
        let signed: Decoded<SignedUrlResponse> = self
            .executor
            .execute_json(Operation::SignedUrl, Some(file.credential.as_str()), |attempt| {
                let request = self
                    .http
                    .get(format!(
                        "{}files/{}/url?expiry={}",
                        attempt.endpoint, file.id, SIGNED_URL_EXPIRY_HOURS
                    ))
                    .header(ACCEPT, "application/json")
                    .bearer_auth(&attempt.credential);
                send(Operation::SignedUrl, request)
            })
            .await?;

        debug!(file_id = %file.id, "Signed URL obtained");
        Ok(signed.value.url)
    }

    async fn run_ocr(
        &self,
        document_url: &str,
        include_images: bool,
        credential: Option<&str>,
    ) -> Result<RawOcrResponse, OcrError> {
        validate_document_url(document_url)?;
        let payload = OcrRequest::for_url(document_url, include_images);

        let Decoded {
            value: response,
            raw,
            ..
        }: Decoded<OcrResponse> = self
            .executor
            .execute_json(Operation::Ocr, credential, |attempt| {
                let request = self
                    .http
                    .post(format!("{}ocr", attempt.endpoint))
                    .bearer_auth(&attempt.credential)
                    .json(&payload);
                send(Operation::Ocr, request)
            })
            .await?;

        info!(
            pages = response.pages.len(),
            images = response.image_count(),
            model = %response.model,
            "OCR complete"
        );
        Ok(RawOcrResponse { response, raw })
    }
}

/// Perform one exchange, reading the whole body.
async fn send(operation: Operation, request: reqwest::RequestBuilder) -> Result<HttpReply, OcrError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport(operation, e))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport(operation, e))?;
    Ok(HttpReply {
        status,
        body: body.to_vec(),
    })
}

fn transport(operation: Operation, e: reqwest::Error) -> OcrError {
    let detail = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    OcrError::Transport { operation, detail }
}

/// Accept only absolute `http`/`https` URLs.
pub fn validate_document_url(url: &str) -> Result<(), OcrError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| OcrError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(OcrError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
