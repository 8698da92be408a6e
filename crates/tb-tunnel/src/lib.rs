//! tb-tunnel: Tunnel lifecycle control for tunnel-bench
//!
//! - [`process`]: spawning, killing and sweeping backend helper processes
//! - [`interface`]: address assignment on the backend's virtual interface
//! - [`backend`]: per-backend command lines, addresses and key layout
//! - [`keys`]: key generation and distribution
//! - [`controller`]: the [`TunnelController`] tying it all together

pub mod backend;
pub mod controller;
pub mod interface;
pub mod keys;
pub mod process;

pub use backend::{Backend, KeyLayout, ProbeTarget};
pub use controller::{TunnelController, TunnelSession};
pub use interface::{assign_address, InterfaceOps, IpRoute2};
pub use process::{CommandSpec, ProcessHandle, Supervisor, SystemSupervisor};
