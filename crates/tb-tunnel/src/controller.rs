//! Tunnel lifecycle controller
//!
//! One controller drives every backend through the same template:
//! sweep, spawn, assign address, go live; and on the way down, kill the
//! tracked process and sweep again. The backend only varies the command
//! line, the interface and the address.

use std::sync::Arc;

use async_trait::async_trait;

use tb_core::config::TunnelConfig;
use tb_core::traits::{Tunnel, TunnelState};
use tb_core::{BackendKind, ConfigError, HostDirectory, HostEntry, Role, TunnelError};

use crate::backend::Backend;
use crate::interface::{assign_address, InterfaceOps, IpRoute2};
use crate::keys;
use crate::process::{ProcessHandle, Supervisor, SystemSupervisor};

/// One open tunnel instance
#[derive(Debug, Default)]
pub struct TunnelSession {
    process: Option<ProcessHandle>,
    address: Option<String>,
}

impl TunnelSession {
    /// Tracked backend process, if any
    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// Address assigned to the interface, if any
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

/// Controls the lifecycle of one tunnel for one role
pub struct TunnelController {
    backend: Backend,
    peer: HostEntry,
    config: TunnelConfig,
    supervisor: Arc<dyn Supervisor>,
    interface: Arc<dyn InterfaceOps>,
    state: TunnelState,
    session: Option<TunnelSession>,
}

impl TunnelController {
    /// Create a controller acting on the real system
    pub fn new(backend: Backend, peer: HostEntry, config: TunnelConfig) -> Self {
        let privilege = config.privilege().map(str::to_string);
        Self::with_ops(
            backend,
            peer,
            config,
            Arc::new(SystemSupervisor::new(privilege.clone())),
            Arc::new(IpRoute2::new(privilege)),
        )
    }

    /// Create a controller with explicit process and interface operations
    pub fn with_ops(
        backend: Backend,
        peer: HostEntry,
        config: TunnelConfig,
        supervisor: Arc<dyn Supervisor>,
        interface: Arc<dyn InterfaceOps>,
    ) -> Self {
        Self {
            backend,
            peer,
            config,
            supervisor,
            interface,
            state: TunnelState::Closed,
            session: None,
        }
    }

    /// Build the controller for `role` from the host directory.
    ///
    /// Fails if the peer has no entry.
    pub fn from_hosts(
        kind: BackendKind,
        role: Role,
        hosts: &HostDirectory,
        config: TunnelConfig,
    ) -> Result<Self, ConfigError> {
        let peer = hosts.lookup(role.peer())?.clone();
        let backend = Backend::new(kind, role, config.key_dir.clone(), peer.address.clone());
        Ok(Self::new(backend, peer, config))
    }

    /// Backend description
    pub fn backend_spec(&self) -> &Backend {
        &self.backend
    }

    /// The live session, if the tunnel is open
    pub fn session(&self) -> Option<&TunnelSession> {
        self.session.as_ref()
    }

    async fn sweep(&self) {
        if let Some(pattern) = self.backend.sweep_pattern() {
            let killed = self.supervisor.sweep(pattern, &self.config.self_marker).await;
            if killed > 0 {
                tracing::info!("Swept {} stray {} process(es)", killed, pattern);
            }
        }
    }

    /// Kill whatever was started during a failed open and fall back to Closed
    async fn abort_open(&mut self, process: Option<ProcessHandle>, error: TunnelError) -> TunnelError {
        tracing::error!("Failed to open {} tunnel: {}", self.backend.kind(), error);
        if let Some(mut process) = process {
            self.supervisor.terminate(&mut process).await;
        }
        self.sweep().await;
        self.state = TunnelState::Closed;
        error
    }

    async fn open_process_backed(&mut self) -> Result<TunnelSession, TunnelError> {
        let (Some(interface), Some(cidr)) = (self.backend.interface(), self.backend.tunnel_cidr()) else {
            return Ok(TunnelSession::default());
        };

        self.sweep().await;

        if let Some(kind) = self.backend.link_kind() {
            let recreated = self.interface.recreate_link(interface, kind).await;
            if let Err(source) = recreated {
                let error = TunnelError::Interface {
                    interface: interface.to_string(),
                    source,
                };
                return Err(self.abort_open(None, error).await);
            }
        }

        let spec = match self.backend.exchange_command() {
            Ok(Some(spec)) => spec,
            Ok(None) => return Ok(TunnelSession::default()),
            Err(e) => return Err(self.abort_open(None, e).await),
        };

        let spawned = self.supervisor.spawn(&spec).await;
        let process = match spawned {
            Ok(process) => process,
            Err(e) => return Err(self.abort_open(None, e).await),
        };

        let assigned =
            assign_address(self.interface.as_ref(), interface, &cidr, self.config.address_attempts).await;
        if let Err(e) = assigned {
            return Err(self.abort_open(Some(process), e).await);
        }

        if self.backend.needs_link_up() {
            let up = self.interface.set_link_up(interface).await;
            if let Err(source) = up {
                let error = TunnelError::Interface {
                    interface: interface.to_string(),
                    source,
                };
                return Err(self.abort_open(Some(process), error).await);
            }
        }

        if let Some(route) = self.backend.route() {
            self.interface.add_route(route, interface).await;
        }

        Ok(TunnelSession {
            process: Some(process),
            address: Some(cidr),
        })
    }

    fn refuse_unless_closed(&self) -> Result<(), TunnelError> {
        if self.state != TunnelState::Closed {
            tracing::warn!("Key operations need a closed tunnel (currently {})", self.state);
            return Err(TunnelError::NotClosed(self.state.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Tunnel for TunnelController {
    fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    fn state(&self) -> TunnelState {
        self.state
    }

    async fn open(&mut self) -> Result<(), TunnelError> {
        if self.state != TunnelState::Closed {
            tracing::warn!("open() while {}; closing the previous session first", self.state);
            self.close().await;
        }

        self.state = TunnelState::Opening;
        tracing::info!("Opening {} tunnel as {}", self.backend.kind(), self.backend.role());

        let session = self.open_process_backed().await?;
        if let Some(address) = session.address() {
            tracing::info!("{} tunnel open with {}", self.backend.kind(), address);
        }
        self.session = Some(session);
        self.state = TunnelState::Open;
        Ok(())
    }

    async fn close(&mut self) {
        if self.state == TunnelState::Closed && self.session.is_none() {
            tracing::debug!("{} tunnel already closed", self.backend.kind());
            return;
        }

        self.state = TunnelState::Closing;
        if let Some(mut session) = self.session.take() {
            if let Some(mut process) = session.process.take() {
                self.supervisor.terminate(&mut process).await;
            }
        }
        self.sweep().await;
        self.state = TunnelState::Closed;
        tracing::info!("{} tunnel closed", self.backend.kind());
    }

    async fn generate_keys(&mut self, force: bool) -> Result<(), TunnelError> {
        self.refuse_unless_closed()?;
        keys::generate_keys(&self.backend, force).await
    }

    async fn share_pubkeys(&mut self, remote_path: &str) -> Result<(), TunnelError> {
        self.refuse_unless_closed()?;
        keys::share_pubkeys(&self.backend, &self.peer, remote_path).await
    }
}
