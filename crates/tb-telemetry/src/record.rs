//! Poll records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CPU and memory load at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareUsage {
    /// CPU usage percentage (0-100)
    pub cpu_percent: f32,
    /// Memory usage percentage (0-100)
    pub ram_percent: f32,
}

/// Network counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUsage {
    /// Packets per second sent, over the last sampling interval
    pub pps_sent: u64,
    /// Packets per second received, over the last sampling interval
    pub pps_recv: u64,
    /// Bytes sent since the session started
    pub bytes_sent: u64,
    /// Bytes received since the session started
    pub bytes_recv: u64,
}

/// Immutable snapshot of the host's counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub time: DateTime<Utc>,
    pub hardware: HardwareUsage,
    pub network: NetworkUsage,
}

/// A labelled sample as it appears in the poll log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollEvent {
    #[serde(rename = "name")]
    pub label: String,
    #[serde(flatten)]
    pub sample: TelemetrySample,
}
