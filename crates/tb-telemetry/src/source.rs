//! Where counters come from

use std::sync::{Mutex, MutexGuard};

use sysinfo::{Networks, System};

/// Traffic direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Host counters read by the samplers and by polls
///
/// Packet and byte counters are cumulative and monotonic.
pub trait CounterSource: Send + Sync {
    /// Cumulative packets in `direction`, summed over all interfaces
    fn packets(&self, direction: Direction) -> u64;

    /// Cumulative bytes in `direction`, summed over all interfaces
    fn bytes(&self, direction: Direction) -> u64;

    /// Current CPU usage percentage
    fn cpu_percent(&self) -> f32;

    /// Current memory usage percentage
    fn ram_percent(&self) -> f32;
}

/// Counters from the operating system via `sysinfo`
pub struct SysinfoSource {
    system: Mutex<System>,
    networks: Mutex<Networks>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a difference between two refreshes; prime the first one
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    fn refreshed_networks(&self) -> MutexGuard<'_, Networks> {
        let mut networks = lock(&self.networks);
        networks.refresh();
        networks
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CounterSource for SysinfoSource {
    fn packets(&self, direction: Direction) -> u64 {
        let networks = self.refreshed_networks();
        networks
            .list()
            .values()
            .map(|data| match direction {
                Direction::Sent => data.total_packets_transmitted(),
                Direction::Received => data.total_packets_received(),
            })
            .sum()
    }

    fn bytes(&self, direction: Direction) -> u64 {
        let networks = self.refreshed_networks();
        networks
            .list()
            .values()
            .map(|data| match direction {
                Direction::Sent => data.total_transmitted(),
                Direction::Received => data.total_received(),
            })
            .sum()
    }

    fn cpu_percent(&self) -> f32 {
        let mut system = lock(&self.system);
        system.refresh_cpu_usage();
        system.global_cpu_usage().clamp(0.0, 100.0)
    }

    fn ram_percent(&self) -> f32 {
        let mut system = lock(&self.system);
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64 * 100.0) as f32
    }
}
