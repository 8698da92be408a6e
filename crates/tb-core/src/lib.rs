//! tb-core: Core abstractions and configuration for tunnel-bench
//!
//! This crate provides the shared types, capability traits, configuration
//! structures and host directory used by the tunnel, telemetry and
//! orchestrator crates.

pub mod config;
pub mod error;
pub mod hosts;
pub mod traits;
pub mod types;

pub use error::{ConfigError, TelemetryError, TunnelError};
pub use hosts::{HostDirectory, HostEntry};
pub use types::{BackendKind, ExchangeOutcome, Role};
