//! Configuration management for tunnel-bench

mod bench;
pub mod serde_utils;

pub use bench::{BenchConfig, ProbeConfig, RetryConfig, TelemetryConfig, TunnelConfig};

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ConfigError;

/// Default configuration file, relative to the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from("tunnel-bench.toml")
}

/// Read a file that must exist, mapping a missing file to [`ConfigError::NotFound`]
pub(crate) fn read_required(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Invalid(format!("cannot read {}: {}", path.display(), e)),
    })
}

/// Write `contents` to `path`, creating missing parent directories
pub(crate) fn write_with_parents(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    parent
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| std::fs::write(path, contents))
        .map_err(|e| ConfigError::Invalid(format!("cannot write {}: {}", path.display(), e)))
}

/// Load a TOML config file
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = read_required(path)?;
    Ok(toml::from_str(&content)?)
}

/// Save a config as pretty TOML
pub fn save_config<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    write_with_parents(path, &toml::to_string_pretty(config)?)
}
