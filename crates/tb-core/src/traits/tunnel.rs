//! Tunnel capability trait

use async_trait::async_trait;
use std::fmt;

use crate::error::TunnelError;
use crate::types::BackendKind;

/// Tunnel lifecycle state
///
/// `Closed → Opening → Open → Closing → Closed`. Key operations are only
/// allowed while `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No session exists
    Closed,
    /// Backend process is being started and addressed
    Opening,
    /// Session is live
    Open,
    /// Session is being torn down
    Closing,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Closed => write!(f, "closed"),
            TunnelState::Opening => write!(f, "opening"),
            TunnelState::Open => write!(f, "open"),
            TunnelState::Closing => write!(f, "closing"),
        }
    }
}

/// A point-to-point link the exchange probe travels over
///
/// Every backend, including the non-tunneled baseline, satisfies the same
/// contract. Failures come back as values; cleanup never fails.
#[async_trait]
pub trait Tunnel: Send {
    /// Backend behind this tunnel
    fn backend(&self) -> BackendKind;

    /// Current lifecycle state
    fn state(&self) -> TunnelState;

    /// Bring the tunnel up. On error the tunnel is back in `Closed`.
    async fn open(&mut self) -> Result<(), TunnelError>;

    /// Tear the tunnel down. Best-effort and idempotent.
    async fn close(&mut self);

    /// Create this role's key material, keeping existing keys unless `force`
    async fn generate_keys(&mut self, force: bool) -> Result<(), TunnelError>;

    /// Copy this role's public key material to the peer's `remote_path`
    async fn share_pubkeys(&mut self, remote_path: &str) -> Result<(), TunnelError>;
}
