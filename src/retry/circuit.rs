//! Per-domain circuit breaker
//!
//! The breaker keeps no state of its own: its position lives in the domain's
//! [`DomainState`], and every method here is meant to be called inside
//! [`DomainStore::with_state`](crate::state::DomainStore::with_state) so that
//! checking and updating happen under one lock.

use crate::config::CircuitBreakerConfig;
use crate::retry::errors::ErrorKind;
use crate::state::{BreakerState, DomainState};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of asking the breaker whether a request may go out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, proceed normally
    Allowed,
    /// Breaker half-open and this request is the single probe
    Probe,
    /// Breaker open, or half-open with the probe already taken
    Rejected,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Breaker thresholds applied to every domain
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.recovery_timeout())
    }

    /// Decides whether a request to the domain may proceed
    ///
    /// An open breaker whose recovery timeout has elapsed moves to half-open
    /// and hands out exactly one probe.
    pub fn admit(&self, state: &mut DomainState, now: Instant) -> Admission {
        match state.breaker {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let recovered = state
                    .last_failure
                    .map(|at| now.saturating_duration_since(at) >= self.recovery_timeout)
                    .unwrap_or(true);

                if recovered {
                    info!("Circuit breaker HALF-OPEN for domain: {}", state.domain);
                    state.breaker = BreakerState::HalfOpen;
                    state.probe_in_flight = true;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => {
                if state.probe_in_flight {
                    Admission::Rejected
                } else {
                    state.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Records the result of an admitted request
    ///
    /// Failures of kinds that do not count toward the breaker are treated as
    /// proof of life, the same as a success.
    pub fn record(&self, state: &mut DomainState, kind: Option<ErrorKind>, now: Instant) {
        match kind {
            Some(kind) if kind.counts_toward_breaker() => self.record_failure(state, kind, now),
            _ => self.record_success(state),
        }
    }

    pub fn record_success(&self, state: &mut DomainState) {
        state.consecutive_failures = 0;
        state.probe_in_flight = false;

        if state.breaker != BreakerState::Closed {
            info!("Circuit breaker CLOSED for domain: {}", state.domain);
            state.breaker = BreakerState::Closed;
        }
    }

    pub fn record_failure(&self, state: &mut DomainState, kind: ErrorKind, now: Instant) {
        state.consecutive_failures += 1;
        state.last_failure = Some(now);

        match state.breaker {
            BreakerState::HalfOpen => {
                warn!(
                    "Circuit breaker probe failed for domain {} ({}), reopening",
                    state.domain, kind
                );
                state.breaker = BreakerState::Open;
                state.probe_in_flight = false;
            }
            BreakerState::Closed if state.consecutive_failures >= self.failure_threshold => {
                warn!(
                    "Circuit breaker OPEN for domain {} after {} consecutive failures. Last error: {}",
                    state.domain, state.consecutive_failures, kind
                );
                state.breaker = BreakerState::Open;
            }
            BreakerState::Closed => {
                debug!(
                    "Circuit breaker failure for domain: {} ({}/{}): {}",
                    state.domain, state.consecutive_failures, self.failure_threshold, kind
                );
            }
            BreakerState::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}
