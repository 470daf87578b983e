//! Synchronized arena of per-domain state
//!
//! All tasks targeting a domain share one [`DomainState`]. The store hands out
//! access only through closures executed under its lock, so every
//! read-decide-write sequence ("is the breaker closed? then count this
//! failure") happens as a single step.

use crate::state::domain_state::{BreakerState, DomainState};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

/// Point-in-time view of one domain, safe to hand to callers
#[derive(Debug, Clone, Serialize)]
pub struct DomainSnapshot {
    pub domain: String,
    pub breaker: BreakerState,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub requests_last_hour: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub current_user_agent: Option<String>,
}

impl DomainSnapshot {
    fn from_state(state: &DomainState, now: Instant) -> Self {
        Self {
            domain: state.domain.clone(),
            breaker: state.breaker,
            consecutive_failures: state.consecutive_failures,
            success_rate: state.success_rate(),
            requests_last_hour: state.requests_in_last_hour(now),
            total_requests: state.total_requests,
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            current_user_agent: state.current_user_agent.clone(),
        }
    }
}

/// Arena of [`DomainState`] records keyed by domain
#[derive(Debug, Default)]
pub struct DomainStore {
    domains: Mutex<HashMap<String, DomainState>>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the domain's state while holding the store lock
    ///
    /// The record is created on first access. The closure must not block or
    /// await; it is meant for short bookkeeping updates only.
    pub fn with_state<R>(&self, domain: &str, f: impl FnOnce(&mut DomainState) -> R) -> R {
        let mut domains = self.domains.lock();
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(domain));
        f(state)
    }

    /// Returns a snapshot of one domain, if it has been seen
    pub fn snapshot(&self, domain: &str) -> Option<DomainSnapshot> {
        let now = Instant::now();
        self.domains
            .lock()
            .get(domain)
            .map(|state| DomainSnapshot::from_state(state, now))
    }

    /// Returns snapshots of every known domain, sorted by domain name
    pub fn snapshots(&self) -> Vec<DomainSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<DomainSnapshot> = self
            .domains
            .lock()
            .values()
            .map(|state| DomainSnapshot::from_state(state, now))
            .collect();
        snapshots.sort_by(|a, b| a.domain.cmp(&b.domain));
        snapshots
    }

    /// Forgets everything about a domain; returns whether it was known
    pub fn reset(&self, domain: &str) -> bool {
        self.domains.lock().remove(domain).is_some()
    }

    /// Forgets every domain
    pub fn clear(&self) {
        self.domains.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.domains.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.lock().is_empty()
    }
}
