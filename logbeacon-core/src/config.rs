//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/logbeacon/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/logbeacon/` (~/.config/logbeacon/)
//! - Data: `$XDG_DATA_HOME/logbeacon/` (~/.local/share/logbeacon/)
//! - State/Logs: `$XDG_STATE_HOME/logbeacon/` (~/.local/state/logbeacon/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Reporter pipeline configuration
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reporter pipeline configuration
///
/// Missing keys take their defaults, so a config file only needs the
/// endpoint and the app identity. The struct is read once when the
/// reporter is constructed and never changes afterward.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    /// Collection endpoint (e.g., `https://logs.example.com/logstores/app/track`)
    #[serde(default)]
    pub endpoint_url: String,

    /// Application identifier stamped on every event
    #[serde(default)]
    pub app_id: String,

    /// Application version stamped on every event
    #[serde(default)]
    pub app_version: String,

    /// Maximum events per upload
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Delay before the delivery loop first touches the queue
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Wait when the queue is empty
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Wait after a successful upload
    #[serde(default = "default_success_wait_ms")]
    pub success_wait_ms: u64,

    /// Wait after a failed upload
    #[serde(default = "default_error_wait_ms")]
    pub error_wait_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            app_id: String::new(),
            app_version: String::new(),
            max_batch_size: default_max_batch_size(),
            startup_delay_ms: default_startup_delay_ms(),
            idle_wait_ms: default_idle_wait_ms(),
            success_wait_ms: default_success_wait_ms(),
            error_wait_ms: default_error_wait_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_max_batch_size() -> usize {
    10
}

fn default_startup_delay_ms() -> u64 {
    2000
}

fn default_idle_wait_ms() -> u64 {
    1000
}

fn default_success_wait_ms() -> u64 {
    1000
}

fn default_error_wait_ms() -> u64 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

impl ReporterConfig {
    /// Create a configuration with the required fields and default timings
    pub fn new(
        endpoint_url: impl Into<String>,
        app_id: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            app_id: app_id.into(),
            app_version: app_version.into(),
            ..Default::default()
        }
    }

    /// Check if the required fields are present
    pub fn is_ready(&self) -> bool {
        !self.endpoint_url.is_empty() && !self.app_id.is_empty() && !self.app_version.is_empty()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_url.is_empty() {
            return Err(Error::Config("reporter.endpoint_url is required".to_string()));
        }
        if !self.endpoint_url.starts_with("http://") && !self.endpoint_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "reporter.endpoint_url must be an http(s) URL, got {:?}",
                self.endpoint_url
            )));
        }
        if self.app_id.is_empty() {
            return Err(Error::Config("reporter.app_id is required".to_string()));
        }
        if self.app_version.is_empty() {
            return Err(Error::Config("reporter.app_version is required".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "reporter.max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn success_wait(&self) -> Duration {
        Duration::from_millis(self.success_wait_ms)
    }

    pub fn error_wait(&self) -> Duration {
        Duration::from_millis(self.error_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/logbeacon/config.toml` (~/.config/logbeacon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("logbeacon").join("config.toml")
    }

    /// Returns the data directory path (for persistent platform storage)
    ///
    /// `$XDG_DATA_HOME/logbeacon/` (~/.local/share/logbeacon/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("logbeacon")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/logbeacon/` (~/.local/state/logbeacon/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("logbeacon")
    }

    /// Returns the file backing the device identifier store
    ///
    /// `$XDG_DATA_HOME/logbeacon/storage.json`
    pub fn device_store_path() -> PathBuf {
        Self::data_dir().join("storage.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/logbeacon/logbeacon.log` (~/.local/state/logbeacon/logbeacon.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("logbeacon.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
