//! Configuration file layer.
//!
//! Settings come from a TOML file, looked up in this order unless a path is
//! given explicitly:
//!
//! 1. `./config.toml`
//! 2. `<user config dir>/mistral-ocr/config.toml`
//! 3. `/etc/mistral-ocr/config.toml`
//!
//! When none exists the defaults are used and [`DEFAULT_CONFIG_TOML`] is
//! written to the user config directory. `MISTRAL_API_KEY` supplies a
//! credential when the file has none. Command-line flags override all of it
//! in the binary.

use crate::config::{OcrConfig, OcrConfigBuilder, ProcessOptions};
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable holding a fallback credential.
pub const API_KEY_ENV: &str = "MISTRAL_API_KEY";

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "mistral-ocr";
const SYSTEM_CONFIG_DIR: &str = "/etc/mistral-ocr";

/// Template written on first run and printed by `config gen`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Mistral OCR configuration

# Credentials. Each request attempt uses the next key in the list, starting
# from a random one, so load spreads over every key. MISTRAL_API_KEY is used
# when this list is empty.
api_keys = [""]

# Service endpoints, tried in rotation. Add mirrors here to fail over when
# one endpoint is unavailable.
base_urls = ["https://api.mistral.ai/v1/"]

# Error handling
continue_on_error = true         # keep going after a failed file in a batch
retry_different_endpoint = true # move to another endpoint after a hard failure

# Output
output_dir = "./output"
include_images = true
default_output_format = "markdown" # markdown or text

# Logging
log_level = "info"     # trace, debug, info, warn, error
log_file = ""          # empty: log to stderr
log_format = "console" # console or json
"#;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_keys: Vec<String>,
    /// Empty means the public endpoint.
    pub base_urls: Vec<String>,
    /// Legacy single-key form; folded into `api_keys` when that is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Legacy single-endpoint form; folded into `base_urls` when that is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub continue_on_error: bool,
    pub retry_different_endpoint: bool,
    pub output_dir: PathBuf,
    pub include_images: bool,
    pub default_output_format: String,
    pub log_level: String,
    /// Empty means stderr.
    pub log_file: String,
    pub log_format: LogFormat,
    /// Accepted for compatibility with older files; unused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_urls: Vec::new(),
            api_key: None,
            base_url: None,
            continue_on_error: true,
            retry_different_endpoint: true,
            output_dir: PathBuf::from("./output"),
            include_images: true,
            default_output_format: "markdown".to_string(),
            log_level: "info".to_string(),
            log_file: String::new(),
            log_format: LogFormat::Console,
            theme: None,
        }
    }
}

/// Settings plus the file they were read from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Parse TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, OcrError> {
        let mut settings: Settings = toml::from_str(text).map_err(|e| {
            OcrError::InvalidConfig(format!("failed to parse {}: {e}", origin.display()))
        })?;
        settings.fold_legacy_keys();
        Ok(settings)
    }

    /// Read one file.
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OcrError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml_str(&text, path)?;
        info!(path = %path.display(), "Loaded config");
        Ok(settings)
    }

    /// Load from `explicit`, or search the standard locations.
    ///
    /// An explicit path that does not exist is an error. A search that finds
    /// nothing yields defaults and writes the template for next time.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings, OcrError> {
        let mut loaded = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(OcrError::InvalidConfig(format!(
                        "config file '{}' does not exist",
                        path.display()
                    )));
                }
                LoadedSettings {
                    settings: Self::from_file(path)?,
                    path: Some(path.to_path_buf()),
                }
            }
            None => {
                let loaded = Self::load_first(&search_paths())?;
                if loaded.path.is_none() {
                    write_default_config_best_effort();
                }
                loaded
            }
        };
        loaded
            .settings
            .apply_env_key(std::env::var(API_KEY_ENV).ok());
        Ok(loaded)
    }

    /// Load the first candidate that exists, or defaults if none do.
    pub fn load_first(candidates: &[PathBuf]) -> Result<LoadedSettings, OcrError> {
        for path in candidates {
            if path.is_file() {
                return Ok(LoadedSettings {
                    settings: Self::from_file(path)?,
                    path: Some(path.clone()),
                });
            }
        }
        debug!("No config file found; using defaults");
        Ok(LoadedSettings {
            settings: Self::default(),
            path: None,
        })
    }

    /// Use `key` as the only credential when none is configured.
    pub fn apply_env_key(&mut self, key: Option<String>) {
        if !self.has_api_keys() {
            if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
                debug!("Using credential from {}", API_KEY_ENV);
                self.api_keys = vec![key];
            }
        }
    }

    fn has_api_keys(&self) -> bool {
        self.api_keys.iter().any(|k| !k.trim().is_empty())
    }

    fn fold_legacy_keys(&mut self) {
        if !self.has_api_keys() {
            if let Some(key) = self.api_key.take().filter(|k| !k.trim().is_empty()) {
                self.api_keys = vec![key];
            }
        }
        if self.base_urls.iter().all(|u| u.trim().is_empty()) {
            if let Some(url) = self.base_url.take().filter(|u| !u.trim().is_empty()) {
                self.base_urls = vec![url];
            }
        }
    }

    /// `None` when logging goes to stderr.
    pub fn log_file(&self) -> Option<&Path> {
        let trimmed = self.log_file.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }

    /// Builder pre-filled from these settings, for further overrides.
    pub fn config_builder(&self) -> OcrConfigBuilder {
        OcrConfig::builder()
            .api_keys(self.api_keys.iter().cloned())
            .base_urls(self.base_urls.iter().cloned())
            .retry_different_endpoint(self.retry_different_endpoint)
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            include_images: self.include_images,
            output_dir: self.output_dir.clone(),
            custom_output_name: None,
            continue_on_error: self.continue_on_error,
        }
    }

    /// Validated client configuration and run options.
    pub fn into_parts(self) -> Result<(OcrConfig, ProcessOptions), OcrError> {
        let config = self.config_builder().build()?;
        Ok((config, self.process_options()))
    }
}

/// Candidate config files, in lookup order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(path) = user_config_path() {
        paths.push(path);
    }
    paths.push(Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME));
    paths
}

/// `<user config dir>/mistral-ocr/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Write [`DEFAULT_CONFIG_TOML`] to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<(), OcrError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| OcrError::OutputWriteFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML).map_err(|e| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}

fn write_default_config_best_effort() {
    let Some(path) = user_config_path() else {
        return;
    };
    if path.exists() {
        return;
    }
    if let Err(e) = write_default_config(&path) {
        warn!("Could not write default config: {}", e.report());
    }
}

/// Replace the credential list in `path` with `[key]`, keeping other keys.
///
/// Creates the file from the template if it does not exist yet.
pub fn set_api_key(path: &Path, key: &str) -> Result<(), OcrError> {
    let text = if path.exists() {
        std::fs::read_to_string(path).map_err(|e| OcrError::io(path, e))?
    } else {
        DEFAULT_CONFIG_TOML.to_string()
    };

    let mut table: toml::Table = text.parse().map_err(|e| {
        OcrError::InvalidConfig(format!("failed to parse {}: {e}", path.display()))
    })?;
    table.insert(
        "api_keys".to_string(),
        toml::Value::Array(vec![toml::Value::String(key.to_string())]),
    );
    table.remove("api_key");

    let out = toml::to_string_pretty(&table)
        .map_err(|e| OcrError::InvalidConfig(format!("failed to serialise config: {e}")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| OcrError::io(parent, e))?;
    }
    std::fs::write(path, out).map_err(|e| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(path = %path.display(), "Updated API key");
    Ok(())
}
