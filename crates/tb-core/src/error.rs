//! Core error types for tunnel-bench

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Role;

/// Configuration-related errors
///
/// All of these are fatal and surface before any round runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Hosts file is not valid JSON
    #[error("Hosts file is malformed: {0}")]
    Hosts(#[from] serde_json::Error),

    /// No host directory entry for a role
    #[error("No host entry for role {0}")]
    MissingHost(Role),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Tunnel lifecycle and key-material errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The backend process could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Every address assignment attempt was rejected
    #[error("Gave up assigning an address to {interface} after {attempts} attempts")]
    AddressExhausted { interface: String, attempts: u32 },

    /// An interface command could not be run at all
    #[error("Interface command failed on {interface}: {source}")]
    Interface {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation requires a closed tunnel
    #[error("Tunnel is not closed (state: {0})")]
    NotClosed(String),

    /// Key generation or distribution failed
    #[error("Key material error: {0}")]
    KeyMaterial(String),
}

/// Telemetry persistence errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Writing the poll log failed
    #[error("Failed to write poll log to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the poll log failed
    #[error("Failed to serialize poll log: {0}")]
    Serialize(#[from] serde_json::Error),
}
