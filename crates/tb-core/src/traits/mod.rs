//! Core trait definitions

mod probe;
mod recorder;
mod tunnel;

pub use probe::ExchangeProbe;
pub use recorder::PollRecorder;
pub use tunnel::{Tunnel, TunnelState};
