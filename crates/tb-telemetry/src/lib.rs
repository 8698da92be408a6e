//! tb-telemetry: Host counter sampling for tunnel-bench
//!
//! A [`Telemetry`] session samples packet rates in the background and
//! records labelled snapshots ("polls") into an ordered log, which is
//! flushed to a [`PollSink`] once when the session stops.

pub mod record;
pub mod sampler;
pub mod session;
pub mod sink;
pub mod source;

pub use record::{HardwareUsage, NetworkUsage, PollEvent, TelemetrySample};
pub use session::{Telemetry, TelemetryOptions, AUTO_POLL_LABEL};
pub use sink::{JsonFileSink, MemorySink, PollSink};
pub use source::{CounterSource, Direction, SysinfoSource};
