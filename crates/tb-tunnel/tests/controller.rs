//! Lifecycle tests for the tunnel controller against scripted system operations

use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tb_core::config::TunnelConfig;
use tb_core::traits::{Tunnel, TunnelState};
use tb_core::{BackendKind, HostEntry, Role, TunnelError};
use tb_tunnel::{Backend, CommandSpec, InterfaceOps, ProcessHandle, Supervisor, TunnelController};

#[derive(Default)]
struct RecordingSupervisor {
    fail_spawn: bool,
    spawned: Mutex<Vec<String>>,
    terminated: AtomicUsize,
    sweeps: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Supervisor for RecordingSupervisor {
    async fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, TunnelError> {
        if self.fail_spawn {
            return Err(TunnelError::Spawn {
                command: spec.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such binary"),
            });
        }
        self.spawned.lock().unwrap().push(spec.to_string());
        Ok(ProcessHandle::detached(spec.to_string()))
    }

    async fn terminate(&self, _handle: &mut ProcessHandle) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }

    async fn sweep(&self, pattern: &str, exclude: &str) -> usize {
        self.sweeps
            .lock()
            .unwrap()
            .push((pattern.to_string(), exclude.to_string()));
        0
    }
}

/// Rejects the first `conflicts` address additions
struct ConflictingInterface {
    conflicts: u32,
    adds: AtomicU32,
    flushes: AtomicU32,
    links_up: AtomicU32,
    routes: Mutex<Vec<String>>,
}

impl ConflictingInterface {
    fn new(conflicts: u32) -> Self {
        Self {
            conflicts,
            adds: AtomicU32::new(0),
            flushes: AtomicU32::new(0),
            links_up: AtomicU32::new(0),
            routes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InterfaceOps for ConflictingInterface {
    async fn add_address(&self, _interface: &str, _cidr: &str) -> io::Result<bool> {
        let n = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n > self.conflicts)
    }

    async fn flush_addresses(&self, _interface: &str) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    async fn recreate_link(&self, _interface: &str, _kind: &str) -> io::Result<()> {
        Ok(())
    }

    async fn set_link_up(&self, _interface: &str) -> io::Result<()> {
        self.links_up.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_route(&self, cidr: &str, _interface: &str) {
        self.routes.lock().unwrap().push(cidr.to_string());
    }
}

fn peer() -> HostEntry {
    HostEntry {
        role: Role::Initiator,
        address: "192.0.2.20".to_string(),
        port: None,
        username: "bench".to_string(),
    }
}

fn config(address_attempts: u32) -> TunnelConfig {
    TunnelConfig {
        address_attempts,
        self_marker: "tunnel-bench".to_string(),
        ..TunnelConfig::default()
    }
}

fn controller(
    kind: BackendKind,
    address_attempts: u32,
    supervisor: Arc<RecordingSupervisor>,
    interface: Arc<ConflictingInterface>,
) -> TunnelController {
    let backend = Backend::new(kind, Role::Responder, "/nonexistent", "192.0.2.20");
    TunnelController::with_ops(backend, peer(), config(address_attempts), supervisor, interface)
}

#[tokio::test]
async fn test_open_survives_three_address_conflicts() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(3));
    let mut tunnel = controller(BackendKind::Rosenpass, 1000, supervisor.clone(), interface.clone());

    tunnel.open().await.unwrap();

    assert_eq!(tunnel.state(), TunnelState::Open);
    assert_eq!(interface.adds.load(Ordering::SeqCst), 4);
    assert_eq!(interface.flushes.load(Ordering::SeqCst), 3);
    assert_eq!(supervisor.spawned.lock().unwrap().len(), 1);
    assert_eq!(tunnel.session().unwrap().address(), Some("fe80::1/64"));

    // Stray processes are swept before spawning, sparing our own
    let sweeps = supervisor.sweeps.lock().unwrap().clone();
    assert_eq!(sweeps, vec![("rosenpass".to_string(), "tunnel-bench".to_string())]);
}

#[tokio::test]
async fn test_close_twice_is_safe() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let mut tunnel = controller(BackendKind::Rosenpass, 1000, supervisor.clone(), interface);

    tunnel.open().await.unwrap();
    tunnel.close().await;
    tunnel.close().await;

    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert!(tunnel.session().is_none());
    assert_eq!(supervisor.terminated.load(Ordering::SeqCst), 1);
    // One sweep on open, one on the first close
    assert_eq!(supervisor.sweeps.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_spawn_failure_leaves_tunnel_closed() {
    let supervisor = Arc::new(RecordingSupervisor {
        fail_spawn: true,
        ..Default::default()
    });
    let interface = Arc::new(ConflictingInterface::new(0));
    let mut tunnel = controller(BackendKind::Rosenpass, 1000, supervisor.clone(), interface.clone());

    let result = tunnel.open().await;

    assert!(matches!(result, Err(TunnelError::Spawn { .. })));
    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert_eq!(interface.adds.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.terminated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_address_exhaustion_kills_spawned_process() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(u32::MAX));
    let mut tunnel = controller(BackendKind::Rosenpass, 5, supervisor.clone(), interface.clone());

    let result = tunnel.open().await;

    assert!(matches!(result, Err(TunnelError::AddressExhausted { attempts: 5, .. })));
    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert!(tunnel.session().is_none());
    assert_eq!(interface.adds.load(Ordering::SeqCst), 5);
    assert_eq!(interface.flushes.load(Ordering::SeqCst), 4);
    assert_eq!(supervisor.terminated.load(Ordering::SeqCst), 1);

    // Closing after a failed open is a no-op
    tunnel.close().await;
    assert_eq!(supervisor.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_noop_backend_touches_nothing() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let mut tunnel = controller(BackendKind::None, 1000, supervisor.clone(), interface.clone());

    tunnel.open().await.unwrap();
    assert_eq!(tunnel.state(), TunnelState::Open);
    tunnel.close().await;
    assert_eq!(tunnel.state(), TunnelState::Closed);

    assert!(supervisor.spawned.lock().unwrap().is_empty());
    assert!(supervisor.sweeps.lock().unwrap().is_empty());
    assert_eq!(interface.adds.load(Ordering::SeqCst), 0);
    assert!(tunnel.generate_keys(false).await.is_ok());
    assert!(tunnel.share_pubkeys("~").await.is_ok());
}

#[tokio::test]
async fn test_openvpn_routes_after_addressing() {
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let backend = Backend::new(BackendKind::OpenVpnStatic, Role::Responder, dir.path(), "192.0.2.20");
    let mut tunnel =
        TunnelController::with_ops(backend, peer(), config(1000), supervisor.clone(), interface.clone());

    tunnel.open().await.unwrap();

    assert_eq!(tunnel.session().unwrap().address(), Some("10.8.0.1/32"));
    assert_eq!(interface.routes.lock().unwrap().as_slice(), ["10.8.0.0/24"]);
    assert_eq!(interface.links_up.load(Ordering::SeqCst), 0);
    assert!(supervisor.spawned.lock().unwrap()[0].starts_with("openvpn --config"));
}

#[tokio::test]
async fn test_key_operations_refused_while_open() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let mut tunnel = controller(BackendKind::Rosenpass, 1000, supervisor, interface);

    tunnel.open().await.unwrap();
    assert!(matches!(
        tunnel.generate_keys(false).await,
        Err(TunnelError::NotClosed(_))
    ));
    assert!(matches!(
        tunnel.share_pubkeys("~").await,
        Err(TunnelError::NotClosed(_))
    ));
    assert_eq!(tunnel.state(), TunnelState::Open);
}

#[tokio::test]
async fn test_reopen_closes_previous_session() {
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let mut tunnel = controller(BackendKind::Rosenpass, 1000, supervisor.clone(), interface);

    tunnel.open().await.unwrap();
    tunnel.open().await.unwrap();

    assert_eq!(supervisor.spawned.lock().unwrap().len(), 2);
    assert_eq!(supervisor.terminated.load(Ordering::SeqCst), 1);
    assert_eq!(tunnel.state(), TunnelState::Open);
}

#[tokio::test]
async fn test_openvpn_pki_refuses_to_open_without_certificates() {
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = Arc::new(RecordingSupervisor::default());
    let interface = Arc::new(ConflictingInterface::new(0));
    let backend = Backend::new(BackendKind::OpenVpn, Role::Initiator, dir.path(), "192.0.2.10");
    let keys = backend.key_layout().unwrap();
    let mut tunnel =
        TunnelController::with_ops(backend, peer(), config(1000), supervisor.clone(), interface.clone());

    assert!(matches!(tunnel.open().await, Err(TunnelError::KeyMaterial(_))));
    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert!(supervisor.spawned.lock().unwrap().is_empty());

    std::fs::create_dir_all(&keys.dir).unwrap();
    for path in [&keys.peer_public, &keys.public, &keys.secret] {
        std::fs::write(path, "pem").unwrap();
    }
    tunnel.open().await.unwrap();

    assert_eq!(tunnel.session().unwrap().address(), Some("10.8.0.2/32"));
    assert_eq!(interface.routes.lock().unwrap().as_slice(), ["10.8.0.0/24"]);
    assert!(supervisor.spawned.lock().unwrap()[0].starts_with("openvpn --config"));
}
