//! Pipeline stages for document OCR.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ client ──────────────────────────────▶ materialize
//! (files)   upload ─▶ signed URL ─▶ OCR request     (images, md, txt, json)
//!             └──── executor + rotator ────┘
//! ```
//!
//! 1. [`input`]     expand files/directories into a work list and name outputs
//! 2. [`rotator`]   round-robin credential and endpoint pools
//! 3. [`executor`]  retry/backoff state machine shared by every remote call
//! 4. [`client`]    the three HTTP operations behind the [`client::OcrBackend`] seam
//! 5. [`images`]    base64 / data-URL image decoding and file naming
//! 6. [`markdown`]  link rewriting and plain-text derivation
//! 7. [`materialize`] writes the artifact set

pub mod client;
pub mod executor;
pub mod images;
pub mod input;
pub mod markdown;
pub mod materialize;
pub mod rotator;
