//! Round driver
//!
//! Each round opens the tunnel, runs the exchange probe with a bounded
//! retry budget and one grace sleep, then closes the tunnel. Telemetry is
//! polled before each transition. This is the only place that decides
//! between retrying and giving up.

use std::sync::Arc;

use tb_core::config::RetryConfig;
use tb_core::traits::{ExchangeProbe, PollRecorder, Tunnel};
use tb_core::{ExchangeOutcome, Role};

use crate::report::{RunError, RunErrorKind, RunReport};

pub const POLL_BEFORE_OPEN: &str = "before-open";
pub const POLL_BEFORE_EXCHANGE: &str = "before-exchange";
pub const POLL_BEFORE_CLOSE: &str = "before-close";

/// Drives benchmark rounds for one role
pub struct Orchestrator<T, P> {
    role: Role,
    tunnel: T,
    probe: P,
    recorder: Arc<dyn PollRecorder>,
    retry: RetryConfig,
}

impl<T: Tunnel, P: ExchangeProbe> Orchestrator<T, P> {
    pub fn new(role: Role, tunnel: T, probe: P, recorder: Arc<dyn PollRecorder>, retry: RetryConfig) -> Self {
        Self {
            role,
            tunnel,
            probe,
            recorder,
            retry,
        }
    }

    pub fn tunnel(&self) -> &T {
        &self.tunnel
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Hand back the tunnel and probe
    pub fn into_parts(self) -> (T, P) {
        (self.tunnel, self.probe)
    }

    /// Run `rounds` rounds, stopping at the first unrecoverable failure
    pub async fn run(&mut self, rounds: u32) -> Result<RunReport, RunError> {
        let mut report = RunReport::default();
        tracing::info!(
            "Starting {} round(s) as {} over {}",
            rounds,
            self.role,
            self.tunnel.backend()
        );

        for round in 1..=rounds {
            tracing::info!("Round {}/{}", round, rounds);

            self.recorder.poll(POLL_BEFORE_OPEN);
            if let Err(e) = self.tunnel.open().await {
                tracing::error!("Round {}: could not open tunnel: {}", round, e);
                return Err(RunError {
                    report,
                    kind: RunErrorKind::TunnelOpen(e),
                });
            }

            self.recorder.poll(POLL_BEFORE_EXCHANGE);
            if let Err(kind) = self.exchange_with_retry(&mut report).await {
                tracing::error!("Round {}: {}", round, kind);
                self.tunnel.close().await;
                return Err(RunError { report, kind });
            }

            self.recorder.poll(POLL_BEFORE_CLOSE);
            self.tunnel.close().await;
            report.rounds_completed += 1;
        }

        tracing::info!(
            "Completed {} round(s) with {} probe attempt(s) and {} grace sleep(s)",
            report.rounds_completed,
            report.attempts,
            report.grace_sleeps
        );
        Ok(report)
    }

    async fn exchange_with_retry(&mut self, report: &mut RunReport) -> Result<(), RunErrorKind> {
        let mut budget = self.retry.budget;
        let mut grace_used = false;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            report.attempts += 1;

            match self.probe.attempt().await {
                ExchangeOutcome::Success => {
                    tracing::debug!("Exchange succeeded on attempt {}", attempts);
                    return Ok(());
                }
                ExchangeOutcome::FatalFailure(reason) => {
                    return Err(RunErrorKind::FatalProbe(reason));
                }
                ExchangeOutcome::RetryableFailure(reason) => {
                    budget = budget.saturating_sub(1);
                    tracing::debug!("Exchange attempt {} failed: {} ({} left)", attempts, reason, budget);
                    if budget > 0 {
                        continue;
                    }
                    if grace_used {
                        return Err(RunErrorKind::RetriesExhausted { attempts });
                    }

                    tracing::warn!(
                        "Exchange failed {} times, waiting {:?} before one more try",
                        attempts,
                        self.retry.backoff
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    budget = self.retry.budget;
                    grace_used = true;
                    report.grace_sleeps += 1;
                }
            }
        }
    }
}
