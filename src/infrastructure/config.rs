//! Configuration infrastructure
//!
//! Contains configuration loading and management for the image pipeline.
//!
//! Configuration is organized into four sections:
//! 1. Pipeline settings (concurrency, deadlines, archive naming)
//! 2. HTTP client settings
//! 3. Catalog and output locations
//! 4. Logging

#![allow(clippy::derivable_impls)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::pipeline::ProbeTimeouts;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub http: HttpConfig,
    pub sources: SourceConfig,
    pub logging: LoggingConfig,
}

/// Worker pool and probe settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent fetches for a single-product archive export
    pub archive_concurrency: usize,

    /// Maximum concurrent probes for the catalog-wide missing-image report
    pub report_concurrency: usize,

    /// Deadline of the head-only existence check
    pub probe_head_timeout_ms: u64,

    /// Deadline of the full-load fallback after an indeterminate head check
    pub probe_load_timeout_ms: u64,

    /// Deadline of an archive-mode content fetch
    pub fetch_timeout_ms: u64,

    /// Extension used when a response declares no known image type
    pub default_extension: String,

    /// Serve archive fetches from images already retrieved in this session
    pub reuse_cached_images: bool,
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Overall request timeout; per-task deadlines are usually shorter
    pub request_timeout_seconds: u64,

    /// Global request rate cap, 0 disables rate limiting
    pub max_requests_per_second: u32,

    pub follow_redirects: bool,
}

/// Where the catalog comes from and where artifacts go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path or http(s) URL of `products.json`
    pub catalog: String,

    /// Path or http(s) URL of the SKU → ASIN map
    pub identifier_map: String,

    /// Directory artifacts are written to
    pub output_dir: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the log file
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory of the log file; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Log file name
    pub file_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            http: HttpConfig::default(),
            sources: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_concurrency: defaults::ARCHIVE_CONCURRENCY,
            report_concurrency: defaults::REPORT_CONCURRENCY,
            probe_head_timeout_ms: defaults::PROBE_HEAD_TIMEOUT_MS,
            probe_load_timeout_ms: defaults::PROBE_LOAD_TIMEOUT_MS,
            fetch_timeout_ms: defaults::FETCH_TIMEOUT_MS,
            default_extension: crate::domain::constants::media::DEFAULT_EXTENSION.to_string(),
            reuse_cached_images: defaults::REUSE_CACHED_IMAGES,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            follow_redirects: true,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            catalog: defaults::CATALOG_SOURCE.to_string(),
            identifier_map: defaults::IDENTIFIER_MAP_SOURCE.to_string(),
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Probe deadlines as durations
    pub const fn timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            head: Duration::from_millis(self.probe_head_timeout_ms),
            load: Duration::from_millis(self.probe_load_timeout_ms),
            fetch: Duration::from_millis(self.fetch_timeout_ms),
        }
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.archive_concurrency == 0 || self.report_concurrency == 0 {
            bail!("Pipeline concurrency must be at least 1");
        }
        if self.probe_head_timeout_ms == 0 || self.probe_load_timeout_ms == 0 || self.fetch_timeout_ms == 0 {
            bail!("Pipeline timeouts must be greater than 0 ms");
        }
        if !self.default_extension.starts_with('.') || self.default_extension.len() < 2 {
            bail!("Default extension must look like \".jpg\", got {:?}", self.default_extension);
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.http.request_timeout_seconds == 0 {
            bail!("HTTP request timeout must be greater than 0 seconds");
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => bail!("Unknown log level: {other}"),
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Configuration manager for the default per-user config file
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join(defaults::CONFIG_FILE_NAME)))
    }

    /// Configuration manager for an explicit config file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file: {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Configuration file is not valid JSON: {:?}", self.config_path))?;

        if let Err(error) = config.validate() {
            warn!("⚠️  Configuration in {:?} is invalid: {}", self.config_path, error);
            return Err(error);
        }

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Reset configuration to defaults (useful for troubleshooting)
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("🔄 Resetting configuration to defaults");

        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;

        info!("✅ Configuration reset to defaults");
        Ok(default_config)
    }

    /// Writes the default configuration only when no file exists yet
    ///
    /// Returns `true` when a new file was created.
    pub async fn init_config(&self) -> Result<bool> {
        if self.config_path.exists() {
            info!("Keeping existing configuration: {:?}", self.config_path);
            return Ok(false);
        }

        self.save_config(&AppConfig::default()).await?;
        Ok(true)
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    /// Directory name under the user config directory
    pub const APP_DIR_NAME: &str = "gallery-image-pipeline";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "config.json";

    pub use crate::domain::constants::pipeline::{
        ARCHIVE_CONCURRENCY, FETCH_TIMEOUT_MS, PROBE_HEAD_TIMEOUT_MS, PROBE_LOAD_TIMEOUT_MS, REPORT_CONCURRENCY,
    };

    /// Reuse images already fetched in this session
    pub const REUSE_CACHED_IMAGES: bool = true;

    /// Default user agent
    pub const USER_AGENT: &str = "gallery-image-pipeline/0.2 (+catalog image export)";

    /// Default overall HTTP request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Default global rate cap
    pub const MAX_REQUESTS_PER_SECOND: u32 = 20;

    /// Default catalog location
    pub const CATALOG_SOURCE: &str = "products.json";

    /// Default identifier map location
    pub const IDENTIFIER_MAP_SOURCE: &str = "asin_map_zip.json";

    /// Default artifact directory
    pub const OUTPUT_DIR: &str = ".";

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = false;

    /// Default log file name
    pub const LOG_FILE_NAME: &str = "gallery-images.log";
}
