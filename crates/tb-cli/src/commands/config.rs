//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use tb_core::config::{self, BenchConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(config::default_config_path)
}

/// Load the effective configuration.
///
/// An explicit path must exist; the default path falls back to built-in
/// defaults when absent.
pub fn load_bench_config(config_path: Option<&PathBuf>) -> Result<BenchConfig> {
    let config: BenchConfig = match config_path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                config::load_config(&default_path)
                    .with_context(|| format!("Failed to load config from {:?}", default_path))?
            } else {
                tracing::debug!("No {:?}, using default configuration", default_path);
                BenchConfig::default()
            }
        }
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print the effective configuration as TOML
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_bench_config(config_path)?;
    let path = resolve(config_path);
    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info("No configuration file, showing defaults");
    }
    println!();
    println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
    Ok(())
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &BenchConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

/// Print the configuration file path in use
pub fn config_path(config_path: Option<&PathBuf>) {
    println!("{}", resolve(config_path).display());
}
