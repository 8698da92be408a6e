//! Key material generation and distribution
//!
//! Each backend keeps its keys under `<key_dir>/<backend dir>/`. Generation
//! shells out to the backend's own tooling; distribution copies this role's
//! public material to the peer with `scp`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;

use tb_core::{BackendKind, HostEntry, Role, TunnelError};

use crate::backend::{Backend, KeyLayout};
use crate::process::{run_to_completion, CommandSpec};

/// Generate key material for `backend`.
///
/// Complete existing material is kept unless `force` is set. Otherwise
/// whatever is there is removed first, since the backend tools refuse to
/// overwrite.
pub async fn generate_keys(backend: &Backend, force: bool) -> Result<(), TunnelError> {
    let Some(keys) = backend.key_layout() else {
        tracing::debug!("{} backend has no key material", backend.kind());
        return Ok(());
    };

    tokio::fs::create_dir_all(&keys.dir).await.map_err(|e| {
        key_error(format!("cannot create {}: {}", keys.dir.display(), e))
    })?;

    let material = backend.generated_material();
    if material.is_empty() {
        return Err(key_error(format!(
            "{} keys for the {} are issued by the peer; run keygen and keysend there",
            backend.kind(),
            backend.role()
        )));
    }

    if !force && material.iter().all(|p| p.exists()) {
        tracing::info!("Keeping existing key material in {}", keys.dir.display());
        return Ok(());
    }
    remove_material(&material).await?;

    match backend.kind() {
        BackendKind::None => return Ok(()),
        BackendKind::Rosenpass => generate_rosenpass(&keys).await?,
        BackendKind::WireGuard => generate_wireguard(&keys).await?,
        BackendKind::OpenVpn => generate_pki(backend, &keys).await?,
        BackendKind::OpenVpnStatic => {
            let spec = CommandSpec::new("openvpn")
                .args(["--genkey", "secret"])
                .arg(keys.secret.display().to_string());
            run_checked(&spec).await?;
        }
    }

    tracing::info!("Generated {} keys in {}", backend.kind(), keys.dir.display());
    Ok(())
}

/// Delete files or directories, ignoring ones that are already gone
pub async fn remove_material(paths: &[PathBuf]) -> Result<(), TunnelError> {
    for path in paths {
        let removed = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => Err(e),
        };
        removed.map_err(|e| key_error(format!("cannot remove {}: {}", path.display(), e)))?;
        tracing::debug!("Removed old key material {}", path.display());
    }
    Ok(())
}

async fn generate_pki(backend: &Backend, keys: &KeyLayout) -> Result<(), TunnelError> {
    let (Some(pki), Some(dh)) = (backend.pki_dir(), backend.dh_params()) else {
        return Err(key_error("only the responder builds the OpenVPN PKI".to_string()));
    };
    let server = Role::Responder.file_tag();
    let client = Role::Initiator.file_tag();

    let easyrsa = |args: &[&str]| {
        CommandSpec::new("easyrsa")
            .arg("--batch")
            .arg(format!("--pki-dir={}", pki.display()))
            .args(args.iter().copied())
    };

    run_checked(&easyrsa(&["init-pki"])).await?;
    run_checked(&easyrsa(&["--req-cn=ca", "build-ca", "nopass"])).await?;
    for name in [server, client] {
        run_checked(&easyrsa(&["gen-req", name, "nopass"])).await?;
    }
    run_checked(&easyrsa(&["sign-req", "server", server])).await?;
    run_checked(&easyrsa(&["sign-req", "client", client])).await?;
    run_checked(&easyrsa(&["gen-dh"])).await?;

    let copies = [
        (pki.join("ca.crt"), &keys.peer_public),
        (pki.join("private").join(format!("{}.key", server)), &keys.secret),
        (pki.join("issued").join(format!("{}.crt", server)), &keys.public),
        (pki.join("dh.pem"), &dh),
    ];
    for (from, to) in copies {
        tokio::fs::copy(&from, to).await.map_err(|e| {
            key_error(format!("cannot copy {} to {}: {}", from.display(), to.display(), e))
        })?;
    }
    Ok(())
}

async fn generate_rosenpass(keys: &KeyLayout) -> Result<(), TunnelError> {
    let secret = keys.secret.display().to_string();
    run_checked(&CommandSpec::new("rp").arg("genkey").arg(&secret)).await?;
    run_checked(
        &CommandSpec::new("rp")
            .arg("pubkey")
            .arg(&secret)
            .arg(keys.public.display().to_string()),
    )
    .await?;
    Ok(())
}

async fn generate_wireguard(keys: &KeyLayout) -> Result<(), TunnelError> {
    let output = run_checked(&CommandSpec::new("wg").arg("genkey")).await?;
    let secret = output.stdout;
    write_key(&keys.secret, &secret).await?;

    // `wg pubkey` reads the secret from stdin
    let mut child = tokio::process::Command::new("wg")
        .arg("pubkey")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| key_error(format!("cannot run `wg pubkey`: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&secret)
            .await
            .map_err(|e| key_error(format!("cannot feed `wg pubkey`: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| key_error(format!("`wg pubkey` did not finish: {}", e)))?;
    if !output.status.success() {
        return Err(key_error(format!(
            "`wg pubkey` failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    write_key(&keys.public, &output.stdout).await
}

async fn write_key(path: &Path, contents: &[u8]) -> Result<(), TunnelError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| key_error(format!("cannot write {}: {}", path.display(), e)))
}

async fn run_checked(spec: &CommandSpec) -> Result<Output, TunnelError> {
    let output = run_to_completion(spec, None)
        .await
        .map_err(|e| key_error(format!("cannot run `{}`: {}", spec, e)))?;
    if !output.status.success() {
        return Err(key_error(format!(
            "`{}` failed: {}",
            spec,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

fn key_error(message: String) -> TunnelError {
    tracing::error!("{}", message);
    TunnelError::KeyMaterial(message)
}

/// The `scp` invocation that ships `files` into the peer's copy of the key directory
pub fn share_command(keys: &KeyLayout, files: &[PathBuf], peer: &HostEntry, remote_path: &str) -> CommandSpec {
    let address = if peer.address.contains(':') {
        format!("[{}]", peer.address)
    } else {
        peer.address.clone()
    };

    let dir_name = keys
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remote = remote_path.trim_end_matches('/');
    let target = if remote.is_empty() {
        format!("{}/", dir_name)
    } else {
        format!("{}/{}/", remote, dir_name)
    };

    CommandSpec::new("scp")
        .arg("-pr")
        .args(files.iter().map(|f| f.display().to_string()))
        .arg(format!("{}@{}:{}", peer.username, address, target))
}

/// Copy this role's public key material to `peer`
pub async fn share_pubkeys(backend: &Backend, peer: &HostEntry, remote_path: &str) -> Result<(), TunnelError> {
    let Some(keys) = backend.key_layout() else {
        tracing::debug!("{} backend has no key material to share", backend.kind());
        return Ok(());
    };

    let files = backend.shared_material().map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;
    if let Some(missing) = files.iter().find(|f| !f.exists()) {
        return Err(key_error(format!(
            "no key material at {}; generate keys first",
            missing.display()
        )));
    }

    let spec = share_command(&keys, &files, peer, remote_path);
    run_checked(&spec).await.map_err(|e| {
        tracing::error!("Could not copy keys to {}; check the SSH key setup", peer.address);
        e
    })?;

    tracing::info!("Shared {} file(s) from {} with {}", files.len(), keys.dir.display(), peer.address);
    Ok(())
}
