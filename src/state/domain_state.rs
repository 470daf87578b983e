use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of recent outcomes used to compute the rolling success rate
pub const OUTCOME_WINDOW: usize = 20;

/// Window used for hourly request volume
pub const VOLUME_WINDOW: Duration = Duration::from_secs(3600);

/// Circuit breaker position for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without touching the network
    Open,
    /// A single probe request is allowed through
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Tracks the state of a domain during crawling
///
/// This structure holds everything the engine remembers about one host: pacing
/// history, rolling outcomes, circuit breaker position and the user agent
/// currently presented to it. It is only ever mutated through
/// [`DomainStore::with_state`](crate::state::DomainStore::with_state).
#[derive(Debug, Clone)]
pub struct DomainState {
    /// The domain this record belongs to
    pub domain: String,

    /// Request timestamps within the last hour (oldest first)
    pub request_times: VecDeque<Instant>,

    /// Most recent outcomes, `true` for success (oldest first)
    pub outcomes: VecDeque<bool>,

    /// Current circuit breaker position
    pub breaker: BreakerState,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// When the most recent failure was recorded
    pub last_failure: Option<Instant>,

    /// Whether the single half-open probe has been handed out
    pub probe_in_flight: bool,

    /// Earliest instant the next request may start
    pub next_slot: Option<Instant>,

    /// User agent presented to this domain
    pub current_user_agent: Option<String>,

    /// Requests sent with the current user agent
    pub requests_since_rotation: u32,

    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            request_times: VecDeque::new(),
            outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
            breaker: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_in_flight: false,
            next_slot: None,
            current_user_agent: None,
            requests_since_rotation: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
        }
    }

    /// Records that a request was made to this domain
    pub fn record_request(&mut self, now: Instant) {
        self.prune_request_times(now);
        self.request_times.push_back(now);
        self.total_requests += 1;
        self.requests_since_rotation += 1;
    }

    /// Records the final outcome of one attempt in the rolling window
    pub fn record_outcome(&mut self, success: bool) {
        if self.outcomes.len() == OUTCOME_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);

        if success {
            self.total_successes += 1;
        } else {
            self.total_failures += 1;
        }
    }

    /// Success rate over the rolling window; 1.0 when nothing was recorded yet
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        successes as f64 / self.outcomes.len() as f64
    }

    /// Number of requests started within the last hour
    pub fn requests_in_last_hour(&self, now: Instant) -> usize {
        self.request_times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < VOLUME_WINDOW)
            .count()
    }

    /// Reserves the next request slot given the spacing between requests
    ///
    /// Concurrent tasks against the same domain each get their own slot, so
    /// they are spread out instead of firing together. Returns how long the
    /// caller has to wait for its slot.
    pub fn reserve_slot(&mut self, now: Instant, spacing: Duration) -> Duration {
        let slot = match self.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_slot = Some(slot + spacing);
        slot.saturating_duration_since(now)
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_slot {
            Some(next) if next > now => Some(next - now),
            _ => None,
        }
    }

    fn prune_request_times(&mut self, now: Instant) {
        while let Some(front) = self.request_times.front() {
            if now.saturating_duration_since(*front) >= VOLUME_WINDOW {
                self.request_times.pop_front();
            } else {
                break;
            }
        }
    }
}
