//! Benchmark configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;

/// Top-level configuration for a benchmark host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Path to the host directory file
    pub hosts_path: PathBuf,

    /// Exchange retry policy
    pub retry: RetryConfig,

    /// Tunnel lifecycle settings
    pub tunnel: TunnelConfig,

    /// Exchange probe settings
    pub probe: ProbeConfig,

    /// Telemetry sampling settings
    pub telemetry: TelemetryConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            hosts_path: PathBuf::from("hosts.json"),
            retry: RetryConfig::default(),
            tunnel: TunnelConfig::default(),
            probe: ProbeConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.budget == 0 {
            return Err(ConfigError::Invalid("retry.budget must be at least 1".to_string()));
        }
        if self.tunnel.address_attempts == 0 {
            return Err(ConfigError::Invalid(
                "tunnel.address_attempts must be at least 1".to_string(),
            ));
        }
        if self.telemetry.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "telemetry.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry of the exchange probe within one round
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retryable attempts allowed before the grace sleep
    pub budget: u32,

    /// Length of the single grace sleep
    #[serde(with = "duration_secs")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: 50,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Tunnel lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Upper bound on address assignment attempts per open
    pub address_attempts: u32,

    /// Prefix for privileged commands (e.g. `sudo`); empty disables it
    pub privilege_command: String,

    /// Directory holding the backend key directories
    pub key_dir: PathBuf,

    /// Command-line substring that marks our own processes during sweeps
    pub self_marker: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            address_attempts: 1000,
            privilege_command: "sudo".to_string(),
            key_dir: PathBuf::from("."),
            self_marker: default_self_marker(),
        }
    }
}

impl TunnelConfig {
    /// Privilege prefix, if any
    pub fn privilege(&self) -> Option<&str> {
        let trimmed = self.privilege_command.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

fn default_self_marker() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "tunnel-bench".to_string())
}

/// Exchange probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for one initiator request
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// How long the responder waits for a request before reporting a retryable failure
    #[serde(with = "duration_secs")]
    pub accept_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            accept_timeout: Duration::from_secs(60),
        }
    }
}

/// Telemetry sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Sampler and automatic poll interval
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,

    /// Whether the automatic poll loop runs
    pub auto: bool,

    /// Directory that receives the poll log files
    pub data_dir: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            auto: false,
            data_dir: PathBuf::from("data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_constants() {
        let config = BenchConfig::default();
        assert_eq!(config.retry.budget, 50);
        assert_eq!(config.retry.backoff, Duration::from_secs(2));
        assert_eq!(config.tunnel.address_attempts, 1000);
        assert_eq!(config.probe.timeout, Duration::from_secs(2));
        assert_eq!(config.telemetry.interval, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BenchConfig = toml::from_str(
            r#"
            hosts_path = "lab/hosts.json"

            [retry]
            budget = 3

            [telemetry]
            interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.hosts_path, PathBuf::from("lab/hosts.json"));
        assert_eq!(config.retry.budget, 3);
        assert_eq!(config.retry.backoff, Duration::from_secs(2));
        assert_eq!(config.telemetry.interval, Duration::from_millis(250));
        assert_eq!(config.tunnel.privilege(), Some("sudo"));
    }

    #[test]
    fn test_empty_privilege_command_disables_prefix() {
        let mut tunnel = TunnelConfig::default();
        tunnel.privilege_command = "  ".to_string();
        assert_eq!(tunnel.privilege(), None);
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = BenchConfig::default();
        config.retry.budget = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_probe_section_has_no_port() {
        // The responder's host entry is the only source of the port
        let rendered = toml::to_string_pretty(&BenchConfig::default()).unwrap();
        let probe = rendered.split("[probe]").nth(1).unwrap();
        let probe = probe.split("\n[").next().unwrap();
        assert!(!probe.contains("port"));

        let config: BenchConfig = toml::from_str("[probe]\nport = 8080\ntimeout = 5\n").unwrap();
        assert_eq!(config.probe.timeout, Duration::from_secs(5));
    }
}
