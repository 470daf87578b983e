//! Performance monitor
//!
//! Lock-free counters updated by the workers and a serializable snapshot for
//! [`Engine::stats`](crate::crawler::Engine::stats).

use crate::crawler::ScrapeResult;
use crate::retry::ErrorKind;
use crate::state::DomainSnapshot;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine-wide counters
pub struct PerformanceMonitor {
    started: Instant,
    submitted: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
    breaker_rejections: AtomicU64,
    rendered: AtomicU64,
    enrichment_failures: AtomicU64,
    fetches: AtomicU64,
    fetch_time_ms: AtomicU64,
    errors: Mutex<BTreeMap<ErrorKind, u64>>,
    page_types: Mutex<BTreeMap<String, u64>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            breaker_rejections: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            enrichment_failures: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            fetch_time_ms: AtomicU64::new(0),
            errors: Mutex::new(BTreeMap::new()),
            page_types: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the network part of a task
    pub fn record_fetch(&self, attempts: u32, elapsed: Duration) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.fetch_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    /// Records a finished task
    ///
    /// # Returns
    ///
    /// The number of tasks completed so far, including this one
    pub fn record_result(&self, result: &ScrapeResult) -> u64 {
        if result.from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if result.rendered {
            self.rendered.fetch_add(1, Ordering::Relaxed);
        }
        if result.enrichment_error.is_some() {
            self.enrichment_failures.fetch_add(1, Ordering::Relaxed);
        }

        match &result.error {
            None => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                *self
                    .page_types
                    .lock()
                    .entry(result.page_type.to_string())
                    .or_insert(0) += 1;
            }
            Some(error) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if error.kind == ErrorKind::CircuitOpen {
                    self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
                }
                *self.errors.lock().entry(error.kind).or_insert(0) += 1;
            }
        }

        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Counter snapshot; the engine fills in the queue, permit, cache and domain fields
    pub fn snapshot(&self) -> EngineStats {
        let fetches = self.fetches.load(Ordering::Relaxed);
        let fetch_time = self.fetch_time_ms.load(Ordering::Relaxed);

        EngineStats {
            uptime_secs: self.started.elapsed().as_secs(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            breaker_rejections: self.breaker_rejections.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            enrichment_failures: self.enrichment_failures.load(Ordering::Relaxed),
            avg_fetch_ms: if fetches == 0 {
                0.0
            } else {
                fetch_time as f64 / fetches as f64
            },
            errors: self
                .errors
                .lock()
                .iter()
                .map(|(kind, count)| (kind.to_string(), *count))
                .collect(),
            page_types: self.page_types.lock().clone(),
            queue_depth: 0,
            in_flight: 0,
            cache_entries: 0,
            domains: Vec::new(),
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub uptime_secs: u64,
    pub submitted: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub retries: u64,
    pub breaker_rejections: u64,
    pub rendered: u64,
    pub enrichment_failures: u64,
    pub avg_fetch_ms: f64,

    /// Failed tasks by error kind
    pub errors: BTreeMap<String, u64>,

    /// Successful tasks by page type
    pub page_types: BTreeMap<String, u64>,

    pub queue_depth: usize,
    pub in_flight: usize,
    pub cache_entries: usize,
    pub domains: Vec<DomainSnapshot>,
}
