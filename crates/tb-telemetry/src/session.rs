//! Telemetry session
//!
//! A session owns two rate samplers, an optional automatic poll loop and the
//! poll log. Manual and automatic polls share one lock around compose and
//! append, so the log order is the order in which polls complete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tb_core::config::TelemetryConfig;
use tb_core::traits::PollRecorder;
use tb_core::TelemetryError;

use crate::record::{HardwareUsage, NetworkUsage, PollEvent, TelemetrySample};
use crate::sampler::{spawn_sampler, Rates};
use crate::sink::PollSink;
use crate::source::{CounterSource, Direction};

/// Label used by the automatic poll loop
pub const AUTO_POLL_LABEL: &str = "automatic poll";

/// Session options
#[derive(Debug, Clone, Copy)]
pub struct TelemetryOptions {
    /// Sampling and automatic poll interval
    pub interval: Duration,
    /// Run the automatic poll loop
    pub auto: bool,
}

impl From<&TelemetryConfig> for TelemetryOptions {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            interval: config.interval,
            auto: config.auto,
        }
    }
}

struct Baseline {
    bytes_sent: u64,
    bytes_recv: u64,
}

struct Shared {
    source: Arc<dyn CounterSource>,
    rates: Arc<Rates>,
    baseline: Baseline,
    log: Mutex<PollLog>,
}

#[derive(Default)]
struct PollLog {
    events: Vec<PollEvent>,
    closed: bool,
}

impl Shared {
    fn log(&self) -> MutexGuard<'_, PollLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sample(&self) -> TelemetrySample {
        TelemetrySample {
            time: Utc::now(),
            hardware: HardwareUsage {
                cpu_percent: self.source.cpu_percent(),
                ram_percent: self.source.ram_percent(),
            },
            network: NetworkUsage {
                pps_sent: self.rates.get(Direction::Sent),
                pps_recv: self.rates.get(Direction::Received),
                bytes_sent: self
                    .source
                    .bytes(Direction::Sent)
                    .saturating_sub(self.baseline.bytes_sent),
                bytes_recv: self
                    .source
                    .bytes(Direction::Received)
                    .saturating_sub(self.baseline.bytes_recv),
            },
        }
    }

    fn poll(&self, label: &str) {
        let mut log = self.log();
        if log.closed {
            tracing::warn!("Poll '{}' after telemetry stopped; dropped", label);
            return;
        }
        let sample = self.sample();
        log.events.push(PollEvent {
            label: label.to_string(),
            sample,
        });
    }
}

/// A running telemetry session
pub struct Telemetry {
    shared: Arc<Shared>,
    sink: Arc<dyn PollSink>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Telemetry {
    /// Start sampling. Must be called from within a tokio runtime.
    pub fn start(source: Arc<dyn CounterSource>, sink: Arc<dyn PollSink>, options: TelemetryOptions) -> Self {
        let baseline = Baseline {
            bytes_sent: source.bytes(Direction::Sent),
            bytes_recv: source.bytes(Direction::Received),
        };
        let rates = Arc::new(Rates::default());
        let shared = Arc::new(Shared {
            source: source.clone(),
            rates: rates.clone(),
            baseline,
            log: Mutex::new(PollLog::default()),
        });

        let cancel = CancellationToken::new();
        let mut tasks = vec![
            spawn_sampler(Direction::Sent, source.clone(), rates.clone(), options.interval, cancel.clone()),
            spawn_sampler(Direction::Received, source, rates, options.interval, cancel.clone()),
        ];
        if options.auto {
            tasks.push(spawn_auto_poll(shared.clone(), options.interval, cancel.clone()));
        }

        tracing::info!(
            "Telemetry started ({:?} interval, automatic polls {})",
            options.interval,
            if options.auto { "on" } else { "off" }
        );

        Self {
            shared,
            sink,
            cancel,
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
        }
    }

    /// Record a labelled snapshot
    pub fn poll(&self, label: &str) {
        self.shared.poll(label);
    }

    /// Number of events recorded and not yet flushed
    pub fn pending(&self) -> usize {
        self.shared.log().events.len()
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop sampling and flush the log to the sink.
    ///
    /// Only the first call does anything; it returns the number of events
    /// flushed. Later calls return `Ok(0)`.
    pub async fn stop(&self) -> Result<usize, TelemetryError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Telemetry already stopped");
            return Ok(0);
        }

        self.cancel.cancel();
        let tasks = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Telemetry task ended abnormally: {}", e);
            }
        }

        let events = {
            let mut log = self.shared.log();
            log.closed = true;
            std::mem::take(&mut log.events)
        };

        let count = events.len();
        self.sink.write(&events).map_err(|e| {
            tracing::error!("Failed to flush {} poll records: {}", count, e);
            e
        })?;
        tracing::info!("Telemetry stopped, {} poll records flushed", count);
        Ok(count)
    }
}

impl PollRecorder for Telemetry {
    fn poll(&self, label: &str) {
        Telemetry::poll(self, label);
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_auto_poll(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if cancel.is_cancelled() {
                break;
            }
            shared.poll(AUTO_POLL_LABEL);
        }
        tracing::debug!("Automatic poll loop stopped");
    })
}
