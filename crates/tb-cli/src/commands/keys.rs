//! Key generation and distribution commands

use anyhow::{Context, Result};

use crate::output::print_success;
use tb_core::config::BenchConfig;
use tb_core::traits::Tunnel;
use tb_core::{BackendKind, HostDirectory, Role};
use tb_tunnel::{keys, Backend, TunnelController};

/// Generate this role's key material for `backend`
pub async fn keygen_command(config: &BenchConfig, role: Role, backend: BackendKind, force: bool) -> Result<()> {
    // Key generation needs no peer
    let backend_spec = Backend::new(backend, role, config.tunnel.key_dir.clone(), String::new());
    keys::generate_keys(&backend_spec, force)
        .await
        .with_context(|| format!("Failed to generate {} keys", backend))?;

    match backend_spec.key_layout() {
        Some(layout) => print_success(&format!("{} keys ready in {:?}", backend, layout.dir)),
        None => print_success(&format!("{} backend needs no keys", backend)),
    }
    Ok(())
}

/// Copy this role's public key material to the peer from the host directory
pub async fn keysend_command(config: &BenchConfig, role: Role, backend: BackendKind, remote_path: &str) -> Result<()> {
    let hosts = HostDirectory::load(&config.hosts_path)
        .with_context(|| format!("Failed to read hosts file {:?}", config.hosts_path))?;
    let mut tunnel = TunnelController::from_hosts(backend, role, &hosts, config.tunnel.clone())
        .context("Host directory has no entry for the peer")?;

    tunnel
        .share_pubkeys(remote_path)
        .await
        .with_context(|| format!("Failed to share {} keys", backend))?;

    let peer = hosts.lookup(role.peer())?;
    print_success(&format!("Sent {} public key to {}@{}", backend, peer.username, peer.address));
    Ok(())
}
