//! Configuration management module
//!
//! Handles loading configuration from multiple sources with proper precedence:
//! CLI arguments > environment variables > TOML files > defaults

use crate::config::cli::CliArgs;
use crate::error::ConfigError;
use crate::routing::table::FIRST_TABLE_ID;
use std::path::Path;

pub mod cli;
pub mod env;
pub mod toml;

/// Configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cni/net.d/sbr.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub log_level: String,
    /// Lowest table id handed out to per-source tables
    pub first_table_id: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            first_table_id: FIRST_TABLE_ID,
        }
    }
}

impl AppConfig {
    /// Resolve the effective configuration for this invocation
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();

        match cli.config.as_deref() {
            Some(path) => {
                let file = toml::load_toml_config(path)?;
                config = toml::apply_toml_config(config, file);
            }
            // The default file is optional
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                let file = toml::load_toml_config(DEFAULT_CONFIG_PATH)?;
                config = toml::apply_toml_config(config, file);
            }
            None => {}
        }

        let config = env::apply_env_config(config)?;
        let config = cli.apply_to_config(config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_table_id == 0 {
            return Err(ConfigError::ValidationError(
                "first_table_id must be at least 1".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Expected one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
