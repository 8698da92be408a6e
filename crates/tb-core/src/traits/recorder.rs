//! Poll recording trait

/// Sink for labeled, point-in-time telemetry snapshots
///
/// Implementations must append under a single writer so that the log order
/// matches the order in which `poll` calls complete.
pub trait PollRecorder: Send + Sync {
    /// Take a snapshot and append it under `label`
    fn poll(&self, label: &str);
}
