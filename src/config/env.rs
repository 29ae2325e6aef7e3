//! Environment variable configuration handling

use crate::config::AppConfig;
use crate::error::ConfigError;
use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "CNI_SBR_";

/// Apply environment variable configuration over base configuration
pub fn apply_env_config(base_config: AppConfig) -> Result<AppConfig, ConfigError> {
    apply_env_from(base_config, |name| env::var(name).ok())
}

/// Apply variables resolved through `lookup` over base configuration
pub fn apply_env_from<F>(mut base_config: AppConfig, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(&format!("{}LOG_LEVEL", ENV_PREFIX)) {
        base_config.log_level = level;
    }

    if let Some(table) = lookup(&format!("{}FIRST_TABLE_ID", ENV_PREFIX)) {
        base_config.first_table_id = parse_table_id(&table)?;
    }

    Ok(base_config)
}

/// Parse a routing table id
pub fn parse_table_id(value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidFormat(format!("Invalid table id: '{}'", value)))
}
