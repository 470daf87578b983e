use crate::config::RetryConfig;
use crate::retry::backoff::Backoff;
use crate::retry::errors::{ErrorKind, FetchError};
use crate::state::BreakerState;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Retry budget for one error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub const fn never() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Built-in budget for a kind
    pub fn default_for(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Network => Self::new(4, Duration::from_secs(1)),
            ErrorKind::Timeout => Self::new(3, Duration::from_secs(2)),
            ErrorKind::RateLimit => Self::new(5, Duration::from_secs(5)),
            ErrorKind::ServerError => Self::new(3, Duration::from_secs(2)),
            ErrorKind::Unknown => Self::new(1, Duration::from_secs(1)),
            _ => Self::never(),
        }
    }
}

/// Why the retry loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The kind has no retry budget at all
    NotRetryable,
    /// The kind's budget is used up
    Exhausted,
    /// The domain's breaker is no longer closed
    CircuitOpen,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp(GiveUpReason),
}

/// Per-kind retry budgets plus the shared backoff schedule
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<ErrorKind, RetryPolicy>,
    backoff: Backoff,
}

impl PolicyTable {
    pub fn new(backoff: Backoff) -> Self {
        let policies = ErrorKind::TRANSPORT_KINDS
            .iter()
            .map(|kind| (*kind, RetryPolicy::default_for(*kind)))
            .collect();
        Self { policies, backoff }
    }

    /// Builds the table from configuration, applying per-kind overrides
    ///
    /// Unknown kind names are skipped here; validation reports them.
    pub fn from_config(config: &RetryConfig) -> Self {
        let mut table = Self::new(Backoff::from_config(config));

        for (name, overrides) in &config.policies {
            let Ok(kind) = ErrorKind::from_str(name) else {
                continue;
            };
            let policy = table.policy(kind);
            table.set_policy(
                kind,
                RetryPolicy::new(
                    overrides.max_retries.unwrap_or(policy.max_retries),
                    overrides
                        .base_delay_ms
                        .map(Duration::from_millis)
                        .unwrap_or(policy.base_delay),
                ),
            );
        }

        table
    }

    pub fn policy(&self, kind: ErrorKind) -> RetryPolicy {
        self.policies
            .get(&kind)
            .copied()
            .unwrap_or_else(RetryPolicy::never)
    }

    pub fn set_policy(&mut self, kind: ErrorKind, policy: RetryPolicy) {
        self.policies.insert(kind, policy);
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Decides whether to retry after a failure
    ///
    /// # Arguments
    ///
    /// * `error` - The classified failure
    /// * `retries_used` - Retries already spent on this error kind
    /// * `breaker` - The domain's breaker position after recording the failure
    ///
    /// # Returns
    ///
    /// The delay before the next attempt, or the reason to stop. A server
    /// supplied `Retry-After` extends the delay but never beyond the backoff
    /// maximum.
    pub fn decide(&self, error: &FetchError, retries_used: u32, breaker: BreakerState) -> RetryDecision {
        let policy = self.policy(error.kind);

        if policy.max_retries == 0 {
            return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
        }
        if breaker != BreakerState::Closed {
            return RetryDecision::GiveUp(GiveUpReason::CircuitOpen);
        }
        if retries_used >= policy.max_retries {
            return RetryDecision::GiveUp(GiveUpReason::Exhausted);
        }

        let mut delay = self
            .backoff
            .delay_for(error.kind, policy.base_delay, retries_used + 1);

        if let Some(retry_after) = error.retry_after {
            delay = delay.max(retry_after.min(self.backoff.max_delay()));
        }

        RetryDecision::Retry { delay }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
