//! TOML configuration file parsing

use crate::config::AppConfig;
use crate::error::ConfigError;
use serde::Deserialize;

/// TOML configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    pub first_table_id: Option<u32>,
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Load configuration from TOML file
pub fn load_toml_config(path: &str) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::FileNotFound { path: path.to_string() })?;

    toml::from_str(&content)
        .map_err(|e| ConfigError::InvalidFormat(e.to_string()))
}

/// Apply values present in the file over `base_config`
pub fn apply_toml_config(mut base_config: AppConfig, file: TomlConfig) -> AppConfig {
    if let Some(first_table_id) = file.first_table_id {
        base_config.first_table_id = first_table_id;
    }

    if let Some(level) = file.logging.and_then(|logging| logging.level) {
        base_config.log_level = level;
    }

    base_config
}
