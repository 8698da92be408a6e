//! tb-orchestrator: Benchmark round orchestration
//!
//! The [`Orchestrator`] drives N rounds of open, exchange and close over a
//! [`Tunnel`](tb_core::traits::Tunnel), polling telemetry at each
//! transition. The [`probe`] module provides the HTTP exchange for both
//! roles.

pub mod orchestrator;
pub mod probe;
pub mod report;

pub use orchestrator::{Orchestrator, POLL_BEFORE_CLOSE, POLL_BEFORE_EXCHANGE, POLL_BEFORE_OPEN};
pub use probe::{HttpInitiatorProbe, HttpResponderProbe};
pub use report::{RunError, RunErrorKind, RunReport};
