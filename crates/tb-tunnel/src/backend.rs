//! Backend variants
//!
//! All process-backed backends share the controller's open/close template.
//! What differs is captured here: the interface, the role-derived tunnel
//! address, the exchange command line, the key file layout and the pattern
//! used to sweep stray processes.

use std::path::{Path, PathBuf};

use tb_core::{BackendKind, Role, TunnelError};

use crate::process::CommandSpec;

/// UDP port the Rosenpass key exchange listens on
pub const ROSENPASS_PORT: u16 = 9999;
/// UDP port WireGuard listens on
pub const WIREGUARD_PORT: u16 = 51820;
/// UDP port of the certificate-based OpenVPN server
pub const OPENVPN_PORT: u16 = 1194;

/// Where this role's key material lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    /// Directory holding all key files of the backend
    pub dir: PathBuf,
    /// This role's secret material
    pub secret: PathBuf,
    /// This role's public material (what gets shared)
    pub public: PathBuf,
    /// The peer's public material, as received from the peer. For the
    /// certificate backend this is the CA certificate that vouches for it.
    pub peer_public: PathBuf,
}

/// Address the initiator's probe connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Responder address
    pub host: String,
    /// Interface to scope a link-local address to
    pub scope: Option<String>,
}

/// A backend bound to a role and a peer
#[derive(Debug, Clone)]
pub struct Backend {
    kind: BackendKind,
    role: Role,
    key_dir: PathBuf,
    peer_address: String,
}

impl Backend {
    /// Describe `kind` as seen from `role`, talking to the host at `peer_address`
    pub fn new(kind: BackendKind, role: Role, key_dir: impl Into<PathBuf>, peer_address: impl Into<String>) -> Self {
        Self {
            kind,
            role,
            key_dir: key_dir.into(),
            peer_address: peer_address.into(),
        }
    }

    /// Backend kind
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Role this backend instance serves
    pub fn role(&self) -> Role {
        self.role
    }

    /// Virtual interface the backend creates
    pub fn interface(&self) -> Option<&'static str> {
        match self.kind {
            BackendKind::None => None,
            BackendKind::Rosenpass => Some("rosenpass0"),
            BackendKind::WireGuard => Some("wg0"),
            BackendKind::OpenVpn | BackendKind::OpenVpnStatic => Some("tun0"),
        }
    }

    /// Role-derived local address, in CIDR notation
    pub fn tunnel_cidr(&self) -> Option<String> {
        let n = self.role.address_suffix();
        match self.kind {
            BackendKind::None => None,
            BackendKind::Rosenpass => Some(format!("fe80::{}/64", n)),
            BackendKind::WireGuard => Some(format!("10.0.0.{}/32", n)),
            BackendKind::OpenVpn | BackendKind::OpenVpnStatic => Some(format!("10.8.0.{}/32", n)),
        }
    }

    /// Link type to create before spawning, for backends that need the link up front
    pub fn link_kind(&self) -> Option<&'static str> {
        match self.kind {
            BackendKind::WireGuard => Some("wireguard"),
            _ => None,
        }
    }

    /// Whether the link must be brought up explicitly after addressing
    pub fn needs_link_up(&self) -> bool {
        self.kind == BackendKind::WireGuard
    }

    /// Subnet routed through the interface once addressed
    pub fn route(&self) -> Option<&'static str> {
        match self.kind {
            BackendKind::WireGuard => Some("10.0.0.0/24"),
            BackendKind::OpenVpn | BackendKind::OpenVpnStatic => Some("10.8.0.0/24"),
            _ => None,
        }
    }

    /// Command-line substring identifying this backend's processes
    pub fn sweep_pattern(&self) -> Option<&'static str> {
        match self.kind {
            BackendKind::None => None,
            BackendKind::Rosenpass => Some("rosenpass"),
            BackendKind::WireGuard => Some("wireguard"),
            BackendKind::OpenVpn | BackendKind::OpenVpnStatic => Some("openvpn"),
        }
    }

    /// Key file layout for this role
    pub fn key_layout(&self) -> Option<KeyLayout> {
        let tag = self.role.file_tag();
        let peer_tag = self.role.peer().file_tag();

        let (dir_name, secret, public, peer_public) = match self.kind {
            BackendKind::None => return None,
            BackendKind::Rosenpass => (
                "rp-keys",
                format!("{}.rosenpass-secret", tag),
                format!("{}.rosenpass-public", tag),
                format!("{}.rosenpass-public", peer_tag),
            ),
            BackendKind::WireGuard => (
                "wg-keys",
                format!("{}.wg-secret", tag),
                format!("{}.wg-public", tag),
                format!("{}.wg-public", peer_tag),
            ),
            BackendKind::OpenVpn => (
                "openvpn-keys",
                format!("{}.key", tag),
                format!("{}.crt", tag),
                "ca.crt".to_string(),
            ),
            // One pre-shared key used by both ends
            BackendKind::OpenVpnStatic => (
                "openvpnstatic-keys",
                "openvpn.key".to_string(),
                "openvpn.key".to_string(),
                "openvpn.key".to_string(),
            ),
        };

        let dir = self.key_dir.join(dir_name);
        Some(KeyLayout {
            secret: dir.join(secret),
            public: dir.join(public),
            peer_public: dir.join(peer_public),
            dir,
        })
    }

    /// easy-rsa working directory; only the responder builds a PKI
    pub fn pki_dir(&self) -> Option<PathBuf> {
        (self.kind == BackendKind::OpenVpn && self.role == Role::Responder).then(|| self.key_dir.join("pki"))
    }

    /// Diffie-Hellman parameters the certificate-based server needs
    pub fn dh_params(&self) -> Option<PathBuf> {
        self.pki_dir()
            .and(self.key_layout())
            .map(|keys| keys.dir.join("dh.pem"))
    }

    /// Everything `generate_keys` writes on this host, removed first on a forced regeneration
    pub fn generated_material(&self) -> Vec<PathBuf> {
        let Some(keys) = self.key_layout() else {
            return Vec::new();
        };
        match self.kind {
            BackendKind::OpenVpn => match (self.pki_dir(), self.dh_params()) {
                (Some(pki), Some(dh)) => vec![pki, keys.peer_public, keys.secret, keys.public, dh],
                // The initiator receives its certificate from the responder
                _ => Vec::new(),
            },
            BackendKind::OpenVpnStatic => vec![keys.secret],
            _ => vec![keys.secret, keys.public],
        }
    }

    /// Files `share_pubkeys` copies to the peer's key directory
    pub fn shared_material(&self) -> Result<Vec<PathBuf>, TunnelError> {
        let Some(keys) = self.key_layout() else {
            return Ok(Vec::new());
        };
        if self.kind != BackendKind::OpenVpn {
            return Ok(vec![keys.public]);
        }

        // The responder signs the initiator's certificate, so it ships the
        // whole client identity along with the CA
        let Some(pki) = self.pki_dir() else {
            return Err(TunnelError::KeyMaterial(
                "OpenVPN certificates are shared from the responder".to_string(),
            ));
        };
        let client = Role::Initiator.file_tag();
        Ok(vec![
            keys.peer_public,
            pki.join("private").join(format!("{}.key", client)),
            pki.join("issued").join(format!("{}.crt", client)),
        ])
    }

    /// Where the initiator's probe should connect, given the responder's
    /// address outside the tunnel
    pub fn probe_target(&self, responder_address: &str) -> ProbeTarget {
        match self.kind {
            BackendKind::None => ProbeTarget {
                host: responder_address.to_string(),
                scope: None,
            },
            BackendKind::Rosenpass => ProbeTarget {
                host: "fe80::1".to_string(),
                scope: self.interface().map(str::to_string),
            },
            BackendKind::WireGuard => ProbeTarget {
                host: "10.0.0.1".to_string(),
                scope: None,
            },
            BackendKind::OpenVpn | BackendKind::OpenVpnStatic => ProbeTarget {
                host: "10.8.0.1".to_string(),
                scope: None,
            },
        }
    }

    /// Long-running exchange process for this role, or `None` for the
    /// non-tunneled baseline. May read peer keys or write a config file.
    pub fn exchange_command(&self) -> Result<Option<CommandSpec>, TunnelError> {
        let Some(keys) = self.key_layout() else {
            return Ok(None);
        };

        let spec = match self.kind {
            BackendKind::None => return Ok(None),
            BackendKind::Rosenpass => self.rosenpass_command(&keys),
            BackendKind::WireGuard => self.wireguard_command(&keys)?,
            BackendKind::OpenVpn => self.openvpn_pki_command(&keys)?,
            BackendKind::OpenVpnStatic => {
                let conf = self.static_key_config(&keys.secret);
                self.openvpn_command(&keys, &conf)?
            }
        };
        Ok(Some(spec))
    }

    fn rosenpass_command(&self, keys: &KeyLayout) -> CommandSpec {
        let spec = CommandSpec::new("rp")
            .privileged()
            .arg("exchange")
            .arg(path_arg(&keys.secret))
            .args(["dev", "rosenpass0"]);

        let spec = match self.role {
            Role::Responder => spec
                .arg("listen")
                .arg(endpoint("::", ROSENPASS_PORT))
                .arg("peer")
                .arg(path_arg(&keys.peer_public)),
            Role::Initiator => spec
                .arg("peer")
                .arg(path_arg(&keys.peer_public))
                .arg("endpoint")
                .arg(endpoint(&self.peer_address, ROSENPASS_PORT)),
        };
        spec.args(["allowed-ips", "fe80::/64"])
    }

    fn wireguard_command(&self, keys: &KeyLayout) -> Result<CommandSpec, TunnelError> {
        let peer_key = std::fs::read_to_string(&keys.peer_public).map_err(|e| {
            TunnelError::KeyMaterial(format!(
                "cannot read peer key {}: {}",
                keys.peer_public.display(),
                e
            ))
        })?;
        let peer_key = peer_key.lines().next().unwrap_or_default().trim().to_string();
        if peer_key.is_empty() {
            return Err(TunnelError::KeyMaterial(format!(
                "peer key {} is empty",
                keys.peer_public.display()
            )));
        }

        Ok(CommandSpec::new("wg")
            .privileged()
            .args(["set", "wg0", "listen-port"])
            .arg(WIREGUARD_PORT.to_string())
            .arg("private-key")
            .arg(path_arg(&keys.secret))
            .arg("peer")
            .arg(peer_key)
            .arg("allowed-ips")
            .arg(format!("10.0.0.{}/32", self.role.peer().address_suffix()))
            .arg("endpoint")
            .arg(endpoint(&self.peer_address, WIREGUARD_PORT)))
    }

    fn openvpn_pki_command(&self, keys: &KeyLayout) -> Result<CommandSpec, TunnelError> {
        let dh = self.dh_params();
        let required = [Some(&keys.peer_public), Some(&keys.public), Some(&keys.secret), dh.as_ref()];
        if let Some(missing) = required.into_iter().flatten().find(|p| !p.exists()) {
            return Err(TunnelError::KeyMaterial(format!(
                "missing {}; generate or receive OpenVPN keys first",
                missing.display()
            )));
        }
        let conf = self.pki_config(keys, dh.as_deref());
        self.openvpn_command(keys, &conf)
    }

    fn openvpn_command(&self, keys: &KeyLayout, conf: &str) -> Result<CommandSpec, TunnelError> {
        let conf_path = keys.dir.join("openvpn.conf");
        std::fs::create_dir_all(&keys.dir)
            .and_then(|_| std::fs::write(&conf_path, conf))
            .map_err(|e| {
                TunnelError::KeyMaterial(format!("cannot write {}: {}", conf_path.display(), e))
            })?;

        Ok(CommandSpec::new("openvpn")
            .privileged()
            .arg("--config")
            .arg(path_arg(&conf_path)))
    }

    /// Certificate-based OpenVPN configuration for this role. The server
    /// hands out 10.8.0.0/24 itself; the client dials the responder.
    pub fn pki_config(&self, keys: &KeyLayout, dh: Option<&Path>) -> String {
        let mut conf = String::new();
        match self.role {
            Role::Responder => {
                conf.push_str(&format!("port {}\nproto udp\ndev tun0\n", OPENVPN_PORT));
            }
            Role::Initiator => {
                conf.push_str("client\ndev tun0\nproto udp\n");
                conf.push_str(&format!("remote {} {}\n", self.peer_address, OPENVPN_PORT));
                conf.push_str("resolv-retry infinite\nnobind\npersist-tun\n");
            }
        }
        conf.push_str(&format!("ca {}\n", keys.peer_public.display()));
        conf.push_str(&format!("cert {}\n", keys.public.display()));
        conf.push_str(&format!("key {}\n", keys.secret.display()));
        if let Some(dh) = dh {
            conf.push_str(&format!("dh {}\n", dh.display()));
        }
        match self.role {
            Role::Responder => conf.push_str("topology subnet\nserver 10.8.0.0 255.255.255.0\n"),
            Role::Initiator => conf.push_str("remote-cert-tls server\n"),
        }
        conf
    }

    /// Static-key OpenVPN configuration for this role
    pub fn static_key_config(&self, key_path: &Path) -> String {
        let local = self.role.address_suffix();
        let remote = self.role.peer().address_suffix();

        let mut conf = String::new();
        if self.role == Role::Initiator {
            conf.push_str(&format!("remote {}\n", self.peer_address));
        }
        conf.push_str("dev tun0\n");
        conf.push_str(&format!("ifconfig 10.8.0.{} 10.8.0.{}\n", local, remote));
        conf.push_str(&format!("secret {}\n", key_path.display()));
        conf.push_str("cipher AES-256-CBC\n");
        conf
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// `host:port`, bracketing IPv6 literals
pub fn endpoint(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
