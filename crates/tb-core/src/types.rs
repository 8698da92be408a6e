//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the exchange this host plays
///
/// The host directory file uses the legacy names `server` and `client`;
/// both spellings are accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Connects out and sends the probe request
    #[serde(rename = "client", alias = "initiator")]
    Initiator,
    /// Listens and answers the probe request
    #[serde(rename = "server", alias = "responder")]
    Responder,
}

impl Role {
    /// The role on the other end of the link
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    /// Host part of the tunnel address (`.1` / `::1` for the responder)
    pub fn address_suffix(self) -> u8 {
        match self {
            Role::Responder => 1,
            Role::Initiator => 2,
        }
    }

    /// Name used in key file names and data file names
    pub fn file_tag(self) -> &'static str {
        match self {
            Role::Responder => "server",
            Role::Initiator => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initiator" | "client" => Ok(Role::Initiator),
            "responder" | "server" => Ok(Role::Responder),
            other => Err(format!(
                "unknown role '{}' (expected initiator/client or responder/server)",
                other
            )),
        }
    }
}

/// Tunnel backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// No tunnel: the non-tunneled baseline
    None,
    /// Rosenpass post-quantum key exchange over WireGuard
    Rosenpass,
    /// Plain WireGuard
    WireGuard,
    /// OpenVPN with certificates from an easy-rsa PKI
    OpenVpn,
    /// OpenVPN with a pre-shared static key
    OpenVpnStatic,
}

impl BackendKind {
    /// All known backends
    pub const ALL: [BackendKind; 5] = [
        BackendKind::None,
        BackendKind::Rosenpass,
        BackendKind::WireGuard,
        BackendKind::OpenVpn,
        BackendKind::OpenVpnStatic,
    ];

    /// Short name used on the command line and in data file names
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::None => "none",
            BackendKind::Rosenpass => "rosenpass",
            BackendKind::WireGuard => "wireguard",
            BackendKind::OpenVpn => "openvpn",
            BackendKind::OpenVpnStatic => "openvpn-static",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "novpn" => Ok(BackendKind::None),
            "rosenpass" | "rp" => Ok(BackendKind::Rosenpass),
            "wireguard" | "wg" => Ok(BackendKind::WireGuard),
            "openvpn" | "ovpn" => Ok(BackendKind::OpenVpn),
            "openvpn-static" | "openvpnstatic" => Ok(BackendKind::OpenVpnStatic),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Result of a single exchange probe try
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The expected response was observed
    Success,
    /// Transient failure, worth another attempt
    RetryableFailure(String),
    /// Non-recoverable failure for this run
    FatalFailure(String),
}

impl ExchangeOutcome {
    /// Whether the attempt succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ExchangeOutcome::Success)
    }
}

impl fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeOutcome::Success => write!(f, "success"),
            ExchangeOutcome::RetryableFailure(reason) => write!(f, "retryable failure: {}", reason),
            ExchangeOutcome::FatalFailure(reason) => write!(f, "fatal failure: {}", reason),
        }
    }
}
