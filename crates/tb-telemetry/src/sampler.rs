//! Packet rate samplers
//!
//! Each sampler reads a cumulative counter, sleeps one interval, reads it
//! again and publishes the difference as a per-second rate. The stop signal
//! is checked once per cycle, so a sampler may outlive `cancel()` by up to
//! one interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::{CounterSource, Direction};

/// Latest published rates
///
/// Written by one sampler each and read by polls without further
/// coordination; a poll may see a rate one interval old.
#[derive(Debug, Default)]
pub struct Rates {
    sent: AtomicU64,
    received: AtomicU64,
}

impl Rates {
    /// Latest rate in `direction`, in packets per second
    pub fn get(&self, direction: Direction) -> u64 {
        self.slot(direction).load(Ordering::Relaxed)
    }

    fn set(&self, direction: Direction, value: u64) {
        self.slot(direction).store(value, Ordering::Relaxed);
    }

    fn slot(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::Sent => &self.sent,
            Direction::Received => &self.received,
        }
    }
}

/// Rate over one interval, never negative even if the counter went backwards
pub fn rate_per_second(before: u64, after: u64, interval: Duration) -> u64 {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (after.saturating_sub(before) as f64 / secs).round() as u64
}

/// Start a sampler for `direction` that runs until `cancel` fires
pub fn spawn_sampler(
    direction: Direction,
    source: Arc<dyn CounterSource>,
    rates: Arc<Rates>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("{:?} rate sampler started ({:?} interval)", direction, interval);
        while !cancel.is_cancelled() {
            let before = source.packets(direction);
            tokio::time::sleep(interval).await;
            let after = source.packets(direction);
            rates.set(direction, rate_per_second(before, after, interval));
        }
        tracing::debug!("{:?} rate sampler stopped", direction);
    })
}
