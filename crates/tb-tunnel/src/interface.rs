//! Virtual interface address management
//!
//! Address assignment retries because the backend creates its interface
//! asynchronously: the first few `ip addr add` calls may race the backend
//! or hit a stale address. Each rejected attempt before the last one is
//! followed by exactly one flush of the interface.

use std::io;

use async_trait::async_trait;

use tb_core::TunnelError;

use crate::process::{run_to_completion, CommandSpec};

/// Operations on a network interface
#[async_trait]
pub trait InterfaceOps: Send + Sync {
    /// Try to add `cidr` to `interface`.
    ///
    /// `Ok(false)` means the kernel rejected the address (typically because it
    /// already exists or the interface is not ready yet); `Err` means the
    /// command could not be run at all.
    async fn add_address(&self, interface: &str, cidr: &str) -> io::Result<bool>;

    /// Remove every address from `interface`. Best-effort.
    async fn flush_addresses(&self, interface: &str);

    /// Delete `interface` if present and create it again as `kind`
    async fn recreate_link(&self, interface: &str, kind: &str) -> io::Result<()>;

    /// Bring `interface` up
    async fn set_link_up(&self, interface: &str) -> io::Result<()>;

    /// Route `cidr` through `interface`. An existing route is not an error.
    async fn add_route(&self, cidr: &str, interface: &str);
}

/// Interface operations through the iproute2 `ip` tool
#[derive(Debug, Clone, Default)]
pub struct IpRoute2 {
    privilege: Option<String>,
}

impl IpRoute2 {
    /// Create with an optional privilege prefix such as `sudo`
    pub fn new(privilege: Option<String>) -> Self {
        Self { privilege }
    }

    async fn ip(&self, args: &[&str]) -> io::Result<std::process::Output> {
        let spec = CommandSpec::new("ip").args(args.iter().copied()).privileged();
        run_to_completion(&spec, self.privilege.as_deref()).await
    }
}

fn stderr_text(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl InterfaceOps for IpRoute2 {
    async fn add_address(&self, interface: &str, cidr: &str) -> io::Result<bool> {
        let output = self.ip(&["addr", "add", cidr, "dev", interface]).await?;
        if !output.status.success() {
            tracing::debug!("ip addr add {} dev {} rejected: {}", cidr, interface, stderr_text(&output));
        }
        Ok(output.status.success())
    }

    async fn flush_addresses(&self, interface: &str) {
        match self.ip(&["addr", "flush", "dev", interface]).await {
            Ok(output) if !output.status.success() => {
                tracing::debug!("ip addr flush dev {}: {}", interface, stderr_text(&output));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to flush addresses on {}: {}", interface, e),
        }
    }

    async fn recreate_link(&self, interface: &str, kind: &str) -> io::Result<()> {
        // Deleting a link that does not exist fails; that is expected on a clean host
        let _ = self.ip(&["link", "del", interface]).await?;

        let output = self.ip(&["link", "add", interface, "type", kind]).await?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("ip link add {} type {}: {}", interface, kind, stderr_text(&output)),
            ));
        }
        Ok(())
    }

    async fn set_link_up(&self, interface: &str) -> io::Result<()> {
        let output = self.ip(&["link", "set", interface, "up"]).await?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("ip link set {} up: {}", interface, stderr_text(&output)),
            ));
        }
        Ok(())
    }

    async fn add_route(&self, cidr: &str, interface: &str) {
        match self.ip(&["route", "add", cidr, "dev", interface]).await {
            Ok(output) if !output.status.success() => {
                tracing::debug!("Route {} via {} not added: {}", cidr, interface, stderr_text(&output));
            }
            Ok(_) => tracing::debug!("Added route {} via {}", cidr, interface),
            Err(e) => tracing::warn!("Failed to add route {} via {}: {}", cidr, interface, e),
        }
    }
}

/// Bind `cidr` to `interface`, flushing and retrying on rejection.
///
/// Returns the number of attempts used. Never makes more than
/// `max_attempts` attempts.
pub async fn assign_address(
    ops: &dyn InterfaceOps,
    interface: &str,
    cidr: &str,
    max_attempts: u32,
) -> Result<u32, TunnelError> {
    tracing::info!("Assigning {} to {}...", cidr, interface);

    for attempt in 1..=max_attempts {
        match ops.add_address(interface, cidr).await {
            Ok(true) => {
                tracing::info!("Address {} assigned to {} (attempt {})", cidr, interface, attempt);
                return Ok(attempt);
            }
            Ok(false) => {
                if attempt < max_attempts {
                    ops.flush_addresses(interface).await;
                }
            }
            Err(source) => {
                tracing::error!("Cannot run address assignment on {}: {}", interface, source);
                return Err(TunnelError::Interface {
                    interface: interface.to_string(),
                    source,
                });
            }
        }
    }

    tracing::error!(
        "Too many attempts assigning {} to {} ({})",
        cidr,
        interface,
        max_attempts
    );
    Err(TunnelError::AddressExhausted {
        interface: interface.to_string(),
        attempts: max_attempts,
    })
}
