//! Centralized error types and handling

use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Plugin invocation error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Network operation error: {0}")]
    Network(#[from] NetworkError),

    #[error("Route management error: {0}")]
    Route(#[from] RouteError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// CNI error code reported to the runtime for this error
    pub fn cni_code(&self) -> u32 {
        match self {
            AppError::Plugin(PluginError::IncompatibleVersion(_)) => 1,
            AppError::Plugin(PluginError::InvalidNetworkConfig(_))
            | AppError::Plugin(PluginError::NotChained)
            | AppError::Plugin(PluginError::NoAddresses { .. }) => 4,
            AppError::Plugin(PluginError::MissingEnvironment { .. })
            | AppError::Plugin(PluginError::UnknownCommand(_)) => 7,
            _ => 999,
        }
    }
}

/// Errors raised by the CNI invocation envelope
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("incompatible CNI version {0}")]
    IncompatibleVersion(String),

    #[error("failed to parse network configuration: {0}")]
    InvalidNetworkConfig(String),

    #[error("This plugin must be called as chained plugin")]
    NotChained,

    #[error("No IP addresses supplied on interface: {interface}")]
    NoAddresses { interface: String },

    #[error("required environment variable {name} is not set")]
    MissingEnvironment { name: String },

    #[error("unknown CNI command: {0}")]
    UnknownCommand(String),

    #[error("failed to write result: {0}")]
    Output(String),
}

/// Network namespace errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to access network namespace: {0}")]
    NamespaceAccess(String),

    #[error("Failed to lock network namespace {path}: {reason}")]
    Lock { path: String, reason: String },

    #[error("Failed to open netlink connection: {0}")]
    Connection(String),
}

/// Route and rule management errors
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Failed to list rules: {0}")]
    ListRules(String),

    #[error("Failed to list routes: {0}")]
    ListRoutes(String),

    #[error("Failed to list addresses: {0}")]
    ListAddresses(String),

    #[error("Cannot find network interface {name}")]
    InterfaceNotFound { name: String },

    #[error("Failed to get link {name}: {reason}")]
    ResolveInterface { name: String, reason: String },

    #[error("Failed to add rule: {0}")]
    AddRule(String),

    #[error("Failed to delete rule: {0}")]
    DeleteRule(String),

    #[error("Failed to add route: {0}")]
    AddRoute(String),

    #[error("Failed to replace route: {0}")]
    ReplaceRoute(String),

    #[error("Failed to delete route: {0}")]
    RemoveRoute(String),

    #[error("Invalid route configuration: {0}")]
    InvalidRoute(String),

    #[error("No free routing table id at or above {0}")]
    TablesExhausted(u32),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
