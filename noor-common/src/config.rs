//! Configuration loading
//!
//! Bootstrap configuration comes from, in priority order:
//! 1. Command-line arguments (applied by the binary on top of this struct)
//! 2. TOML config file
//! 3. Built-in defaults
//!
//! A missing config file is not an error: the hub logs a warning and starts
//! with defaults.

use crate::models::VotePolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,

    /// HTTP server port
    pub port: u16,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Hub behavior
    pub hub: HubSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5760,
            database_path: PathBuf::from("noor_canvas.db"),
            logging: LoggingConfig::default(),
            hub: HubSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "noor_hub=info,tower_http=info".to_string(),
        }
    }
}

/// Hub behavior settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Maximum question length in characters
    pub question_max_chars: usize,

    /// Allowed vote values
    pub vote_policy: VotePolicy,

    /// Attempts made on a conflicting vote upsert before giving up
    pub vote_retry_limit: u32,

    /// Outbound queue capacity per connection
    pub connection_buffer: usize,

    /// SSE keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            question_max_chars: 280,
            vote_policy: VotePolicy::Flag,
            vote_retry_limit: 3,
            connection_buffer: 256,
            keep_alive_secs: 15,
        }
    }
}

impl HubSettings {
    /// Reject settings the hub cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.question_max_chars == 0 {
            return Err(Error::Config("hub.question_max_chars must be at least 1".into()));
        }
        if self.vote_retry_limit == 0 {
            return Err(Error::Config("hub.vote_retry_limit must be at least 1".into()));
        }
        if self.connection_buffer == 0 {
            return Err(Error::Config("hub.connection_buffer must be at least 1".into()));
        }
        if self.keep_alive_secs == 0 {
            return Err(Error::Config("hub.keep_alive_secs must be at least 1".into()));
        }
        Ok(())
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.hub.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file path
    ///
    /// `None` or a missing file yields defaults; a present but malformed file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file given, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file not found: {}, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5760);
        assert_eq!(config.hub.question_max_chars, 280);
        assert_eq!(config.hub.vote_policy, VotePolicy::Flag);
        assert!(config.hub.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000

            [hub]
            vote_policy = "signed"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.hub.vote_policy, VotePolicy::Signed);
        assert_eq!(config.hub.vote_retry_limit, 3);
    }

    #[test]
    fn test_invalid_hub_settings_rejected() {
        let result = TomlConfig::from_toml_str("[hub]\nquestion_max_chars = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_keep_alive_rejected() {
        let result = TomlConfig::from_toml_str("[hub]\nkeep_alive_secs = 0\n");
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("keep_alive_secs")));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
