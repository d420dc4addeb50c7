//! Wire types for the Mistral OCR API.
//!
//! Field names follow the service's JSON exactly. Everything that the
//! materializer does not strictly need is optional or defaulted so that
//! slightly different response framings still deserialize.

use serde::{Deserialize, Serialize};

/// Model identifier sent with every OCR request.
pub const OCR_MODEL: &str = "mistral-ocr-latest";

/// The result of one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    /// Pages in reading order.
    pub pages: Vec<Page>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage_info: UsageInfo,
}

impl OcrResponse {
    /// Total number of images across all pages.
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub pages_processed: u64,
    #[serde(default)]
    pub doc_size_bytes: Option<u64>,
}

/// One recognised page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based position in the document.
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<Image>,
    /// Informational only; never used when assembling output.
    #[serde(default)]
    pub dimensions: Option<PageDimensions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDimensions {
    #[serde(default)]
    pub dpi: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

/// An image embedded in a page.
///
/// `id` is unique within one response but not across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub top_left_x: i64,
    #[serde(default)]
    pub top_left_y: i64,
    #[serde(default)]
    pub bottom_right_x: i64,
    #[serde(default)]
    pub bottom_right_y: i64,
    /// Raw base64 or a `data:<mime>;base64,<payload>` URL. Absent when the
    /// request did not ask for image content.
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// A saved `metadata.json` (or similar wrapper) carrying the response under
/// `raw_response`. Read when a file does not parse as an [`OcrResponse`]
/// with pages.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponseEnvelope {
    pub raw_response: OcrResponse,
}

/// Body of a successful `POST files`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Body of a successful `GET files/<id>/url`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// JSON body of `POST ocr`.
#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest<'a> {
    pub model: &'a str,
    pub document: DocumentRef<'a>,
    pub include_image_base64: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRef<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub document_url: &'a str,
}

impl<'a> OcrRequest<'a> {
    pub fn for_url(document_url: &'a str, include_image_base64: bool) -> Self {
        Self {
            model: OCR_MODEL,
            document: DocumentRef {
                kind: "document_url",
                document_url,
            },
            include_image_base64,
        }
    }
}

/// A response paired with the exact bytes it was decoded from.
#[derive(Debug, Clone)]
pub struct RawOcrResponse {
    pub response: OcrResponse,
    pub raw: Vec<u8>,
}
