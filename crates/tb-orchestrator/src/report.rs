//! Run outcomes

use thiserror::Error;

use tb_core::TunnelError;

/// What a run got through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Rounds that reached `close()` after a successful exchange
    pub rounds_completed: u32,
    /// Probe attempts across all rounds
    pub attempts: u32,
    /// Grace sleeps taken across all rounds
    pub grace_sleeps: u32,
}

/// Why a run stopped early
#[derive(Debug, Error)]
pub enum RunErrorKind {
    /// The tunnel could not be brought up
    #[error("tunnel open failed: {0}")]
    TunnelOpen(TunnelError),

    /// Retry budget and grace sleep both used up within one round
    #[error("exchange still failing after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The probe saw something it cannot recover from
    #[error("fatal exchange failure: {0}")]
    FatalProbe(String),
}

/// A failed run, with what it managed before failing
#[derive(Debug, Error)]
#[error("run failed after {} completed round(s): {}", .report.rounds_completed, .kind)]
pub struct RunError {
    pub report: RunReport,
    pub kind: RunErrorKind,
}
