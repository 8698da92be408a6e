//! Host directory: who plays which role, and how to reach them
//!
//! The directory lives in a small JSON file shared by both hosts:
//!
//! ```json
//! {
//!   "hosts": [
//!     { "role": "server", "ip_addr": "192.0.2.10", "port": "80", "user": "bench" },
//!     { "role": "client", "ip_addr": "192.0.2.20", "user": "bench" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::config::{read_required, write_with_parents};
use crate::error::ConfigError;
use crate::types::Role;

/// A single host entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Role of this host
    pub role: Role,
    /// Reachable address of the host (outside any tunnel)
    #[serde(rename = "ip_addr")]
    pub address: String,
    /// Port the responder listens on; absent for the initiator
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_port"
    )]
    pub port: Option<u16>,
    /// Login name used for key distribution
    #[serde(rename = "user")]
    pub username: String,
}

impl HostEntry {
    /// Parse `USER@ADDRESS` or `USER@ADDRESS:PORT`
    pub fn parse(role: Role, spec: &str) -> Result<Self, ConfigError> {
        let (username, rest) = spec.split_once('@').ok_or_else(|| {
            ConfigError::Invalid(format!("expected USER@ADDRESS[:PORT], got '{}'", spec))
        })?;

        if username.is_empty() || rest.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "expected USER@ADDRESS[:PORT], got '{}'",
                spec
            )));
        }

        // Bracketed IPv6 literal, optionally followed by :PORT
        let (address, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (addr, tail) = stripped.split_once(']').ok_or_else(|| {
                ConfigError::Invalid(format!("unterminated IPv6 literal in '{}'", spec))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(parse_port(p)?),
                None if tail.is_empty() => None,
                None => return Err(ConfigError::Invalid(format!("bad address '{}'", rest))),
            };
            (addr.to_string(), port)
        } else {
            match rest.rsplit_once(':') {
                Some((addr, p)) if !addr.contains(':') => (addr.to_string(), Some(parse_port(p)?)),
                _ => (rest.to_string(), None),
            }
        };

        Ok(Self {
            role,
            address,
            port,
            username: username.to_string(),
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(format!("invalid port '{}'", raw)))
}

/// The legacy file stores ports as strings; accept both strings and numbers.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(n)) => Ok(Some(n)),
        Some(RawPort::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", s))),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HostsFile {
    hosts: Vec<HostEntry>,
}

/// Lookup table from role to host entry
#[derive(Debug, Clone, Default)]
pub struct HostDirectory {
    entries: Vec<HostEntry>,
}

impl HostDirectory {
    /// Build a directory from entries; later entries replace earlier ones for the same role
    pub fn from_entries(entries: impl IntoIterator<Item = HostEntry>) -> Self {
        let mut directory = Self::default();
        for entry in entries {
            directory.upsert(entry);
        }
        directory
    }

    /// Load and validate the directory file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&read_required(path)?)
    }

    /// Parse the directory from JSON text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: HostsFile = serde_json::from_str(content)?;
        if file.hosts.is_empty() {
            return Err(ConfigError::Invalid("hosts file has no entries".to_string()));
        }
        Ok(Self::from_entries(file.hosts))
    }

    /// Write the directory file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = HostsFile {
            hosts: self.entries.clone(),
        };
        write_with_parents(path, &serde_json::to_string_pretty(&file)?)
    }

    /// Insert or replace the entry for a role
    pub fn upsert(&mut self, entry: HostEntry) {
        self.entries.retain(|e| e.role != entry.role);
        self.entries.push(entry);
    }

    /// Entry for a role
    pub fn lookup(&self, role: Role) -> Result<&HostEntry, ConfigError> {
        self.entries
            .iter()
            .find(|e| e.role == role)
            .ok_or(ConfigError::MissingHost(role))
    }

    /// Port the responder listens on
    pub fn responder_port(&self) -> Result<u16, ConfigError> {
        self.lookup(Role::Responder)?
            .port
            .ok_or_else(|| ConfigError::MissingField("port for the server host entry".to_string()))
    }

    /// Check that both roles are present and the responder has a port
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lookup(Role::Initiator)?;
        self.responder_port()?;
        Ok(())
    }

    /// All entries
    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }
}
