//! Configuration types for OCR runs.
//!
//! [`OcrConfig`] holds everything the API client needs (credentials,
//! endpoints, retry policy, timeouts) and is built through
//! [`OcrConfigBuilder`], which normalises and validates it. Per-run output
//! choices live separately in [`ProcessOptions`] so one client can serve
//! several differently-configured runs.
//!
//! Loading these values from a TOML file lives in [`crate::settings`].

use crate::error::OcrError;
use std::fmt;
use std::path::PathBuf;

/// Endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1/";

/// Upload size limit enforced before any network call (50 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Upper bound accepted for `max_retries`.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Client configuration.
///
/// # Example
/// ```rust
/// use mistral_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .api_keys(["key-a", "key-b"])
///     .base_urls(["https://api.mistral.ai/v1"])
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_urls[0], "https://api.mistral.ai/v1/");
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Credentials rotated round-robin per request attempt.
    pub api_keys: Vec<String>,

    /// Service base URLs, each ending in `/`. Never empty after `build()`.
    pub base_urls: Vec<String>,

    /// Retries per endpoint after the first attempt. Default: 3.
    ///
    /// An operation makes at most `endpoints × (max_retries + 1)` requests.
    pub max_retries: u32,

    /// Base of the exponential backoff in milliseconds. Default: 1000.
    ///
    /// Retry `n` (1-based) waits `retry_backoff_ms * 2^(n-1)`: 1 s, 2 s, 4 s.
    pub retry_backoff_ms: u64,

    /// Move to another endpoint on non-transient failures. Default: true.
    ///
    /// When false, only the first selected endpoint is ever tried and any
    /// non-transient, non-auth status is returned immediately.
    pub retry_different_endpoint: bool,

    /// Per-request transport timeout in seconds. Default: 300.
    pub request_timeout_secs: u64,

    /// Largest file accepted for upload. Default: 50 MiB.
    pub max_upload_bytes: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_urls: vec![DEFAULT_BASE_URL.to_string()],
            max_retries: 3,
            retry_backoff_ms: 1000,
            retry_different_endpoint: true,
            request_timeout_secs: 300,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<String> = self.api_keys.iter().map(|k| mask_credential(k)).collect();
        f.debug_struct("OcrConfig")
            .field("api_keys", &masked)
            .field("base_urls", &self.base_urls)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("retry_different_endpoint", &self.retry_different_endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self {
                base_urls: Vec::new(),
                ..Self::default()
            },
        }
    }

    /// Fail unless at least one credential is configured.
    pub fn require_credentials(&self) -> Result<(), OcrError> {
        if self.api_keys.is_empty() {
            return Err(OcrError::InvalidConfig(
                "at least one API key is required.\n\
                 Pass --api-keys, set MISTRAL_API_KEY, or add api_keys to the config file."
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.api_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.base_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn retry_different_endpoint(mut self, v: bool) -> Self {
        self.config.retry_different_endpoint = v;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Build the configuration, normalising lists and validating limits.
    pub fn build(mut self) -> Result<OcrConfig, OcrError> {
        let c = &mut self.config;

        c.api_keys = c
            .api_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        c.base_urls = c
            .base_urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(normalize_base_url)
            .collect();
        if c.base_urls.is_empty() {
            c.base_urls.push(DEFAULT_BASE_URL.to_string());
        }

        for url in &c.base_urls {
            if reqwest::Url::parse(url).is_err() {
                return Err(OcrError::InvalidConfig(format!(
                    "base URL '{url}' is not a valid absolute URL"
                )));
            }
        }

        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(OcrError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES_LIMIT}, got {}",
                c.max_retries
            )));
        }

        Ok(self.config)
    }
}

/// Options for one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Ask the service for image content and write `images/*`. Default: true.
    pub include_images: bool,
    /// Root directory; each item gets `<output_dir>/<name>/`. Default: `./output`.
    pub output_dir: PathBuf,
    /// Overrides the per-item directory name.
    pub custom_output_name: Option<String>,
    /// Keep going after a failed item in a batch. Default: true.
    pub continue_on_error: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            output_dir: PathBuf::from("./output"),
            custom_output_name: None,
            continue_on_error: true,
        }
    }
}

impl ProcessOptions {
    /// Custom name, ignoring blank strings.
    pub fn output_name(&self) -> Option<&str> {
        self.custom_output_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Ensure a base URL ends with `/` so operation paths can be appended.
pub fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Mask a credential for logs: first and last four characters kept.
pub fn mask_credential(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
