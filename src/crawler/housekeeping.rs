//! Periodic cache maintenance and memory pressure relief

use crate::cache::ResponseCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one housekeeping pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HousekeepingReport {
    pub expired: usize,
    pub expired_on_disk: usize,

    /// Entries dropped to relieve memory pressure
    pub shrunk: usize,

    /// Process memory as a fraction of total memory, when it could be read
    pub memory_fraction: Option<f64>,
}

/// Reads process memory usage
pub trait MemoryProbe: Send + Sync {
    /// Resident memory of this process divided by total memory
    fn memory_fraction(&self) -> Option<f64>;
}

/// [`MemoryProbe`] backed by sysinfo
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn memory_fraction(&self) -> Option<f64> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_process(pid);

        let total = system.total_memory();
        let used = system.process(pid)?.memory();
        if total == 0 {
            return None;
        }
        Some(used as f64 / total as f64)
    }
}

/// Evicts expired cache entries and shrinks the cache under memory pressure
pub struct Housekeeper {
    cache: Arc<ResponseCache>,
    memory: Arc<dyn MemoryProbe>,
    memory_threshold: f64,
}

impl Housekeeper {
    pub fn new(cache: Arc<ResponseCache>, memory: Arc<dyn MemoryProbe>, memory_threshold: f64) -> Self {
        Self {
            cache,
            memory,
            memory_threshold,
        }
    }

    /// Runs one pass
    ///
    /// Expired entries are always evicted. When process memory exceeds the
    /// threshold the in-memory cache is cut to half its current size.
    pub async fn run_once(&self) -> HousekeepingReport {
        let mut report = HousekeepingReport {
            expired: self.cache.evict_expired(),
            ..HousekeepingReport::default()
        };

        match self.cache.evict_expired_disk().await {
            Ok(removed) => report.expired_on_disk = removed,
            Err(e) => warn!("Failed to evict expired disk cache entries: {}", e),
        }

        report.memory_fraction = self.memory.memory_fraction();
        if let Some(fraction) = report.memory_fraction {
            if fraction > self.memory_threshold {
                let target = self.cache.len() / 2;
                report.shrunk = self.cache.shrink_to(target);
                warn!(
                    "Memory usage {:.1}% above {:.1}%, dropped {} cache entries",
                    fraction * 100.0,
                    self.memory_threshold * 100.0,
                    report.shrunk
                );
            }
        }

        debug!(
            "Housekeeping: {} expired, {} expired on disk, {} shrunk",
            report.expired, report.expired_on_disk, report.shrunk
        );
        report
    }

    /// Runs a pass every `interval` until `cancel` fires
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = cancel.cancelled() => {
                        info!("Housekeeping stopped");
                        break;
                    }
                }
            }
        })
    }
}
