//! # Host Configuration
//!
//! Everything the host needs is read from one TOML file. Every key has a
//! default, so an empty file is a valid configuration.
//!
//! ## Example
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! timeout_secs = 5.0
//!
//! [printer]
//! default_firmware_version = "V4.13"
//! monitoring_interval_secs = 3.0
//!
//! [files]
//! directory = "/mnt/usb-share"
//!
//! [web]
//! bind = "0.0.0.0:5000"
//! ```
//!
//! Two environment variables are applied on top of the file:
//! `RESIN_SERIAL_PORT` and `RESIN_BIND_ADDR`.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const SERIAL_PORT_ENV: &str = "RESIN_SERIAL_PORT";
pub const BIND_ADDR_ENV: &str = "RESIN_BIND_ADDR";

const MIN_SECONDS: f64 = 0.001;
const MAX_SECONDS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the serial link, printer behaviour, print files and web API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Serial link configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Base response timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Pause between opening the port and the hello probe.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            timeout_secs: default_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Printer behaviour configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    /// Used until the firmware reports its own protocol version.
    #[serde(default = "default_firmware_version")]
    pub default_firmware_version: String,
    #[serde(default = "default_monitoring_interval_secs")]
    pub monitoring_interval_secs: f64,
    /// Feed rate for relative Z moves, mm/min.
    #[serde(default = "default_z_feed_rate")]
    pub z_feed_rate: u32,
    /// Pause after `M21` before the next storage command.
    #[serde(default = "default_storage_settle_ms")]
    pub storage_settle_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            default_firmware_version: default_firmware_version(),
            monitoring_interval_secs: default_monitoring_interval_secs(),
            z_feed_rate: default_z_feed_rate(),
            storage_settle_ms: default_storage_settle_ms(),
        }
    }
}

impl PrinterConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitoring_interval_secs)
    }

    pub fn storage_settle(&self) -> Duration {
        Duration::from_millis(self.storage_settle_ms)
    }
}

/// Print file directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_files_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            directory: default_files_directory(),
            allowed_extensions: default_allowed_extensions(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Config {
    /// Reject values the host cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port must not be empty".to_string()));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be positive".to_string()));
        }
        check_seconds("serial.timeout_secs", self.serial.timeout_secs)?;
        check_seconds("printer.monitoring_interval_secs", self.printer.monitoring_interval_secs)?;
        if self.files.allowed_extensions.iter().any(|ext| !ext.starts_with('.')) {
            return Err(ConfigError::Invalid(
                "files.allowed_extensions entries must start with '.'".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `RESIN_SERIAL_PORT` / `RESIN_BIND_ADDR` over the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(SERIAL_PORT_ENV).ok(),
            std::env::var(BIND_ADDR_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, port: Option<String>, bind: Option<String>) {
        if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
            tracing::info!("Serial port overridden from environment: {}", port);
            self.serial.port = port;
        }
        if let Some(bind) = bind.filter(|b| !b.trim().is_empty()) {
            tracing::info!("Bind address overridden from environment: {}", bind);
            self.web.bind = bind;
        }
    }
}

/// Durations in seconds must lie between 1 ms and one day.
fn check_seconds(key: &str, value: f64) -> Result<(), ConfigError> {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{key} must be between {MIN_SECONDS} and {MAX_SECONDS} seconds, got {value}"
        )))
    }
}

fn default_port() -> String { "/dev/serial0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_timeout_secs() -> f64 { 5.0 }
fn default_settle_delay_ms() -> u64 { 2000 }
fn default_firmware_version() -> String { "V4.13".to_string() }
fn default_monitoring_interval_secs() -> f64 { 3.0 }
fn default_z_feed_rate() -> u32 { 600 }
fn default_storage_settle_ms() -> u64 { 1000 }
fn default_files_directory() -> PathBuf { PathBuf::from("/mnt/usb-share") }
fn default_max_file_size() -> u64 { 500 * 1024 * 1024 }
fn default_bind() -> String { "0.0.0.0:5000".to_string() }

fn default_allowed_extensions() -> Vec<String> {
    [".ctb", ".cbddlp", ".pwmx", ".pwmo", ".pwms", ".pws", ".pw0", ".pwx"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Read and parse a configuration file, apply environment overrides, then validate.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    let mut config: Config = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
