//! Configuration module
//!
//! Handles scanner tuning, connection defaults and logging settings

mod settings;

pub use settings::{AppConfig, ConfigError, ConnectionDefaults, LoggingConfig, ScannerConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sockexpect", "Sockexpect").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sockexpect", "Sockexpect").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the default configuration file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Get the transcript directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

/// Initialize application directories
pub fn init_directories() -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    if let Some(dir) = log_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
