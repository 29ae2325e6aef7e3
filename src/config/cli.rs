//! Command-line argument parsing
//!
//! Container runtimes invoke CNI plugins through `CNI_*` environment
//! variables, so every invocation argument falls back to its variable.

use crate::config::env::parse_table_id;
use crate::config::AppConfig;
use crate::error::ConfigError;
use clap::Parser;

/// Command-line arguments structure
#[derive(Parser, Debug)]
#[command(name = "sbr")]
#[command(about = "Source based routing meta plugin for container network namespaces")]
#[command(version)]
pub struct CliArgs {
    /// CNI command (ADD, DEL, CHECK, VERSION)
    #[arg(long, env = "CNI_COMMAND", help = "CNI command to run")]
    pub command: Option<String>,

    /// Container id
    #[arg(long, env = "CNI_CONTAINERID", help = "Container id")]
    pub container_id: Option<String>,

    /// Network namespace path
    #[arg(long, env = "CNI_NETNS", help = "Path to the container network namespace")]
    pub netns: Option<String>,

    /// Interface name inside the container
    #[arg(long, env = "CNI_IFNAME", help = "Interface to configure")]
    pub ifname: Option<String>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, help = "Set the logging level")]
    pub log_level: Option<String>,

    /// First routing table id to allocate
    #[arg(long, help = "Lowest table id used for per-source routing tables")]
    pub first_table_id: Option<String>,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    pub print_default_config: bool,
}

impl CliArgs {
    /// Apply CLI arguments over base configuration
    pub fn apply_to_config(&self, mut base_config: AppConfig) -> Result<AppConfig, ConfigError> {
        if let Some(ref level) = self.log_level {
            base_config.log_level = level.clone();
        }

        if let Some(ref table) = self.first_table_id {
            base_config.first_table_id = parse_table_id(table)?;
        }

        Ok(base_config)
    }
}

/// Print default configuration in TOML format
pub fn print_default_config() {
    let default_config = AppConfig::default();

    println!("# Source based routing plugin configuration");
    println!("# This is the default configuration with all available options");
    println!();
    println!("# Lowest routing table id handed out to per-source tables");
    println!("first_table_id = {}", default_config.first_table_id);
    println!();
    println!("[logging]");
    println!("# Log level: trace, debug, info, warn, error");
    println!("level = \"{}\"", default_config.log_level);
}
