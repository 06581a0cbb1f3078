//! Application settings

use crate::core::logger::LogFormat;
use crate::utils::unescape;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default bytes requested per read
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default read timeout applied to streams that have none, in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scanner tuning
    pub scanner: ScannerConfig,
    /// Defaults for connections opened by the CLI
    pub connection: ConnectionDefaults,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from the platform config file, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the platform config file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.save_to(&path)
    }

    /// Save to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scanner.validate()?;
        if !(self.connection.connect_timeout_secs.is_finite()
            && self.connection.connect_timeout_secs > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "connection.connect_timeout_secs must be positive, got {}",
                self.connection.connect_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Scanner tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum bytes requested per read
    pub chunk_size: usize,
    /// Soft cap on buffered bytes
    pub max_buffer_size: usize,
    /// Read timeout applied to streams that have none, in seconds
    pub default_timeout_secs: f64,
    /// Line terminator for `send_line`; `\r`, `\n` and `\xNN` escapes are
    /// decoded
    pub terminator: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_buffer_size: 4 * DEFAULT_CHUNK_SIZE,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            terminator: "\r\n".to_string(),
        }
    }
}

impl ScannerConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("scanner.chunk_size must be at least 1".into()));
        }
        if self.max_buffer_size < self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "scanner.max_buffer_size ({}) must be at least chunk_size ({})",
                self.max_buffer_size, self.chunk_size
            )));
        }
        if !(self.default_timeout_secs.is_finite() && self.default_timeout_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scanner.default_timeout_secs must be positive, got {}",
                self.default_timeout_secs
            )));
        }
        self.terminator_bytes()?;
        Ok(())
    }

    /// Default timeout as a `Duration`; out-of-range values fall back to
    /// one second.
    pub fn default_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(1))
    }

    /// Terminator with escapes decoded
    pub fn terminator_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        unescape(&self.terminator)
            .map_err(|e| ConfigError::Invalid(format!("scanner.terminator: {e}")))
    }
}

/// Defaults for connections opened by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDefaults {
    /// TCP connect timeout, in seconds
    pub connect_timeout_secs: f64,
    /// Read timeout set right after connecting; unset lets the scanner
    /// apply its default
    pub read_timeout_secs: Option<f64>,
    /// Serial baud rate
    pub baud_rate: u32,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10.0,
            read_timeout_secs: None,
            baud_rate: 115_200,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Transcript file format
    pub transcript_format: LogFormat,
    /// Timestamps in transcript lines
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            transcript_format: LogFormat::Text,
            timestamps: true,
        }
    }
}
