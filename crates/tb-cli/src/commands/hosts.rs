//! Host directory commands

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{format_hosts, print_info, print_success};
use tb_core::{ConfigError, HostDirectory, HostEntry, Role};

/// Add or replace host entries, creating the file if needed
pub fn hosts_set(path: &Path, responder: Option<&str>, initiator: Option<&str>) -> Result<()> {
    if responder.is_none() && initiator.is_none() {
        anyhow::bail!("Nothing to set: pass --responder and/or --initiator");
    }

    let mut directory = match HostDirectory::load(path) {
        Ok(directory) => directory,
        Err(ConfigError::NotFound(_)) => HostDirectory::default(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read hosts file {:?}", path)),
    };

    if let Some(spec) = responder {
        let entry = HostEntry::parse(Role::Responder, spec).context("Invalid --responder")?;
        if entry.port.is_none() {
            anyhow::bail!("The responder entry needs a port (USER@ADDRESS:PORT)");
        }
        directory.upsert(entry);
    }
    if let Some(spec) = initiator {
        directory.upsert(HostEntry::parse(Role::Initiator, spec).context("Invalid --initiator")?);
    }

    directory
        .save(path)
        .with_context(|| format!("Failed to write hosts file {:?}", path))?;
    print_success(&format!("Updated {:?}", path));

    if let Err(e) = directory.validate() {
        print_info(&format!("Directory is incomplete: {}", e));
    }
    Ok(())
}

/// Print the host directory
pub fn hosts_show(path: &Path) -> Result<()> {
    let directory =
        HostDirectory::load(path).with_context(|| format!("Failed to read hosts file {:?}", path))?;
    println!("{}", format_hosts(directory.entries()));
    Ok(())
}
