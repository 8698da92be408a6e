//! Round orchestration against counting tunnel, probe and recorder doubles

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tb_core::config::RetryConfig;
use tb_core::traits::{ExchangeProbe, PollRecorder, Tunnel, TunnelState};
use tb_core::{BackendKind, ExchangeOutcome, Role, TunnelError};
use tb_orchestrator::{Orchestrator, RunErrorKind, POLL_BEFORE_CLOSE, POLL_BEFORE_EXCHANGE, POLL_BEFORE_OPEN};

#[derive(Default)]
struct CountingTunnel {
    opens: u32,
    closes: u32,
    fail_open_on: Option<u32>,
    state: Option<TunnelState>,
}

#[async_trait]
impl Tunnel for CountingTunnel {
    fn backend(&self) -> BackendKind {
        BackendKind::None
    }

    fn state(&self) -> TunnelState {
        self.state.unwrap_or(TunnelState::Closed)
    }

    async fn open(&mut self) -> Result<(), TunnelError> {
        self.opens += 1;
        if self.fail_open_on == Some(self.opens) {
            return Err(TunnelError::AddressExhausted {
                interface: "wg0".to_string(),
                attempts: 3,
            });
        }
        self.state = Some(TunnelState::Open);
        Ok(())
    }

    async fn close(&mut self) {
        if self.state() == TunnelState::Open {
            self.closes += 1;
        }
        self.state = Some(TunnelState::Closed);
    }

    async fn generate_keys(&mut self, _force: bool) -> Result<(), TunnelError> {
        Ok(())
    }

    async fn share_pubkeys(&mut self, _remote_path: &str) -> Result<(), TunnelError> {
        Ok(())
    }
}

/// Plays back a script of outcomes, then keeps returning `fallback`
struct ScriptedProbe {
    script: VecDeque<ExchangeOutcome>,
    fallback: ExchangeOutcome,
    attempts: u32,
}

impl ScriptedProbe {
    fn always(outcome: ExchangeOutcome) -> Self {
        Self::scripted(Vec::new(), outcome)
    }

    fn scripted(script: Vec<ExchangeOutcome>, fallback: ExchangeOutcome) -> Self {
        Self {
            script: script.into(),
            fallback,
            attempts: 0,
        }
    }
}

#[async_trait]
impl ExchangeProbe for ScriptedProbe {
    async fn attempt(&mut self) -> ExchangeOutcome {
        self.attempts += 1;
        self.script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
struct LabelLog {
    labels: Mutex<Vec<String>>,
    polls: AtomicU32,
}

impl PollRecorder for LabelLog {
    fn poll(&self, label: &str) {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.labels.lock().unwrap().push(label.to_string());
    }
}

fn retry(budget: u32, backoff_secs: u64) -> RetryConfig {
    RetryConfig {
        budget,
        backoff: Duration::from_secs(backoff_secs),
    }
}

fn retryable() -> ExchangeOutcome {
    ExchangeOutcome::RetryableFailure("connection refused".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_pairs_every_open_with_close() {
    let log = Arc::new(LabelLog::default());
    let mut orchestrator = Orchestrator::new(
        Role::Initiator,
        CountingTunnel::default(),
        ScriptedProbe::always(ExchangeOutcome::Success),
        log.clone(),
        retry(50, 2),
    );

    let report = orchestrator.run(3).await.unwrap();

    assert_eq!(report.rounds_completed, 3);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.grace_sleeps, 0);
    assert_eq!(orchestrator.tunnel().opens, 3);
    assert_eq!(orchestrator.tunnel().closes, 3);

    let labels = log.labels.lock().unwrap().clone();
    assert_eq!(labels.len(), 9);
    for round in labels.chunks(3) {
        assert_eq!(round, [POLL_BEFORE_OPEN, POLL_BEFORE_EXCHANGE, POLL_BEFORE_CLOSE]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_rounds_does_nothing() {
    let log = Arc::new(LabelLog::default());
    let mut orchestrator = Orchestrator::new(
        Role::Responder,
        CountingTunnel::default(),
        ScriptedProbe::always(ExchangeOutcome::Success),
        log.clone(),
        retry(50, 2),
    );

    let report = orchestrator.run(0).await.unwrap();
    assert_eq!(report.rounds_completed, 0);
    assert_eq!(orchestrator.tunnel().opens, 0);
    assert_eq!(log.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_retryable_failure_uses_one_grace_sleep() {
    let log = Arc::new(LabelLog::default());
    let mut orchestrator = Orchestrator::new(
        Role::Initiator,
        CountingTunnel::default(),
        ScriptedProbe::always(retryable()),
        log,
        retry(50, 2),
    );

    let started = tokio::time::Instant::now();
    let error = orchestrator.run(1).await.unwrap_err();

    assert!(matches!(error.kind, RunErrorKind::RetriesExhausted { attempts: 100 }));
    assert_eq!(error.report.grace_sleeps, 1);
    assert_eq!(error.report.attempts, 100);
    assert_eq!(error.report.rounds_completed, 0);
    assert_eq!(orchestrator.probe().attempts, 100);
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    // The tunnel opened for the round is not left behind
    assert_eq!(orchestrator.tunnel().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sixty_failures_recover_after_grace_sleep() {
    let mut script: Vec<_> = (0..60).map(|_| retryable()).collect();
    script.push(ExchangeOutcome::Success);

    let log = Arc::new(LabelLog::default());
    let mut orchestrator = Orchestrator::new(
        Role::Initiator,
        CountingTunnel::default(),
        ScriptedProbe::scripted(script, ExchangeOutcome::Success),
        log,
        retry(50, 2),
    );

    let report = orchestrator.run(1).await.unwrap();
    assert_eq!(report.attempts, 61);
    assert_eq!(report.grace_sleeps, 1);
    assert_eq!(report.rounds_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_grace_is_granted_per_round() {
    // Round 1 needs the grace sleep, round 2 does too
    let mut script: Vec<_> = (0..4).map(|_| retryable()).collect();
    script.push(ExchangeOutcome::Success);
    script.extend((0..4).map(|_| retryable()));
    script.push(ExchangeOutcome::Success);

    let mut orchestrator = Orchestrator::new(
        Role::Initiator,
        CountingTunnel::default(),
        ScriptedProbe::scripted(script, ExchangeOutcome::Success),
        Arc::new(LabelLog::default()),
        retry(3, 1),
    );

    let report = orchestrator.run(2).await.unwrap();
    assert_eq!(report.grace_sleeps, 2);
    assert_eq!(report.attempts, 10);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_aborts_without_retry() {
    // Round 1 succeeds, round 2 fails fatally on its first attempt
    let script = vec![
        ExchangeOutcome::Success,
        ExchangeOutcome::FatalFailure("not an HTTP status line".to_string()),
    ];
    let log = Arc::new(LabelLog::default());
    let mut orchestrator = Orchestrator::new(
        Role::Initiator,
        CountingTunnel::default(),
        ScriptedProbe::scripted(script, ExchangeOutcome::Success),
        log.clone(),
        retry(50, 2),
    );

    let error = orchestrator.run(5).await.unwrap_err();

    assert!(matches!(error.kind, RunErrorKind::FatalProbe(_)));
    assert_eq!(error.report.rounds_completed, 1);
    assert_eq!(error.report.grace_sleeps, 0);
    assert_eq!(orchestrator.probe().attempts, 2);
    assert_eq!(orchestrator.tunnel().opens, 2);

    // Round 2 never reached its before-close poll
    let labels = log.labels.lock().unwrap().clone();
    assert_eq!(
        labels,
        [
            POLL_BEFORE_OPEN,
            POLL_BEFORE_EXCHANGE,
            POLL_BEFORE_CLOSE,
            POLL_BEFORE_OPEN,
            POLL_BEFORE_EXCHANGE
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_aborts_run() {
    let tunnel = CountingTunnel {
        fail_open_on: Some(2),
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(
        Role::Responder,
        tunnel,
        ScriptedProbe::always(ExchangeOutcome::Success),
        Arc::new(LabelLog::default()),
        retry(50, 2),
    );

    let error = orchestrator.run(3).await.unwrap_err();

    assert!(matches!(error.kind, RunErrorKind::TunnelOpen(_)));
    assert_eq!(error.report.rounds_completed, 1);
    assert_eq!(orchestrator.probe().attempts, 1);
    let (tunnel, _probe) = orchestrator.into_parts();
    assert_eq!(tunnel.closes, 1);
    assert!(error.to_string().starts_with("run failed after 1 completed round(s)"));
}
