//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILDIRSYNC_CONFIG` (environment variable)
//! 2. `~/.config/maildirsync/config.toml` (Linux/macOS)
//!    `%APPDATA%\maildirsync\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::maildir::scanner::ScanOptions;
use crate::parser::envelope::DEFAULT_MAX_MESSAGE_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Record store location.
    pub store: StoreConfig,
    /// Directory scanning and ingestion limits.
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// `strftime` format string for dates in list output.
    pub date_format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to the user data directory.
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Messages larger than this many bytes are skipped.
    pub max_message_size: usize,
    /// Ignore dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Ignore maildir `tmp/` directories.
    pub skip_tmp: bool,
    /// Follow symlinks while scanning.
    pub follow_links: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            skip_hidden: false,
            skip_tmp: false,
            follow_links: false,
        }
    }
}

impl SyncConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            skip_hidden: self.skip_hidden,
            skip_tmp: self.skip_tmp,
            follow_links: self.follow_links,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILDIRSYNC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("maildirsync").join("config.toml"))
}

/// Database file: command-line override, then config, then the data directory.
pub fn database_path(config: &Config, cli_override: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_override {
        return path;
    }
    if let Some(ref path) = config.store.database {
        return path.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maildirsync")
        .join("mail.db")
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maildirsync")
}
