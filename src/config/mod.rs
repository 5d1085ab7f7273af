//! Configuration management for Postbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use postbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `POSTBOX__<section>__<key>`
//!
//! Examples:
//! - `POSTBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `POSTBOX__REMOTE__BASE_URL=https://sandbox.tiktokapis.com`
//! - `POSTBOX__TRANSFER__DEFAULT_CHUNK_SIZE=16MB`
//!
//! Secrets come only from dedicated environment variables
//! (`POSTBOX_CLIENT_SECRET`, `POSTBOX_ACCESS_TOKEN`), never from TOML.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/postbox.toml`.
//! This can be overridden using the `POSTBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, Credentials, PollingConfig, RemoteSettings, RetentionConfig, ServerConfig,
    TransferConfig, WebhookConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`POSTBOX__*`)
    /// 2. TOML file (default: `config/postbox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[credentials]
client_key = "awkey123"

[server]
bind_addr = "127.0.0.1:8088"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.credentials.client_key, "awkey123");
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:8088");
    }

    #[test]
    fn test_validation_catches_bad_chunk_size() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[transfer]
default_chunk_size = "1MB"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidChunkSize(_))
        ));
    }
}
