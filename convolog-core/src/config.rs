//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/convolog/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/convolog/` (~/.config/convolog/)
//! - Data: `$XDG_DATA_HOME/convolog/` (~/.local/share/convolog/)
//! - State/Logs: `$XDG_STATE_HOME/convolog/` (~/.local/state/convolog/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

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
    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sync source configuration
#[derive(Debug, Deserialize, Default)]
pub struct SyncConfig {
    /// Override path for the assistant's data directory (defaults to ~/.claude)
    pub claude_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
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
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the root directory the sync engine reads logs from.
    ///
    /// Uses the `[sync] claude_dir` override when present, otherwise
    /// `~/.claude`.
    pub fn claude_dir(&self) -> PathBuf {
        self.sync
            .claude_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/convolog/config.toml` (~/.config/convolog/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("convolog").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/convolog/` (~/.local/share/convolog/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("convolog")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/convolog/` (~/.local/state/convolog/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("convolog")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/convolog/convolog.db` (~/.local/share/convolog/convolog.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("convolog.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/convolog/convolog.log` (~/.local/state/convolog/convolog.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("convolog.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sync.claude_dir.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sync]
claude_dir = "/srv/assistant-logs"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.sync.claude_dir,
            Some(PathBuf::from("/srv/assistant-logs"))
        );
        assert_eq!(config.claude_dir(), PathBuf::from("/srv/assistant-logs"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_claude_dir_default() {
        let config = Config::default();
        assert!(config.claude_dir().ends_with(".claude"));
    }
}
