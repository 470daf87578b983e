use crate::config::Config;
use crate::crawler::{FetchOutcome, FetchResponse};
use crate::retry::circuit::{Admission, CircuitBreaker};
use crate::retry::errors::{classify, into_result, ErrorKind, FetchError};
use crate::retry::policy::{PolicyTable, RetryDecision};
use crate::state::{BreakerState, DomainStore};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Final result of a retried fetch
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<FetchResponse, FetchError>,

    /// Attempts that actually reached the transport
    pub attempts: u32,

    /// Backoff sleeps taken between attempts
    pub retries: u32,
}

/// Runs fetch attempts under the per-kind retry budgets and the domain breaker
pub struct RetryManager {
    policies: PolicyTable,
    breaker: CircuitBreaker,
    store: Arc<DomainStore>,
    max_attempts: u32,
}

impl RetryManager {
    pub fn new(
        policies: PolicyTable,
        breaker: CircuitBreaker,
        store: Arc<DomainStore>,
        max_attempts: u32,
    ) -> Self {
        Self {
            policies,
            breaker,
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &Config, store: Arc<DomainStore>) -> Self {
        Self::new(
            PolicyTable::from_config(&config.retry),
            CircuitBreaker::from_config(&config.circuit_breaker),
            store,
            config.engine.max_attempts,
        )
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Executes `attempt` until it succeeds or retrying stops making sense
    ///
    /// Before every attempt the domain's breaker is consulted; after every
    /// attempt its outcome is recorded in the same locked step that reads the
    /// breaker position used for the retry decision. The future returned by
    /// `attempt` is where pacing, permits and the transport call live, so no
    /// permit is held while this loop sleeps.
    ///
    /// # Arguments
    ///
    /// * `domain` - Domain whose breaker and outcome window are used
    /// * `attempt` - Called with the 1-based attempt number
    pub async fn execute<F, Fut>(&self, domain: &str, mut attempt: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut retries_by_kind: HashMap<ErrorKind, u32> = HashMap::new();
        let mut attempts = 0;
        let mut retries = 0;

        loop {
            let admission = self
                .store
                .with_state(domain, |state| self.breaker.admit(state, Instant::now()));

            if admission == Admission::Rejected {
                debug!("Skipping {}: circuit breaker open", domain);
                return RetryOutcome {
                    result: Err(FetchError::circuit_open(domain)),
                    attempts,
                    retries,
                };
            }

            let mut probe = ProbeGuard::new(&self.store, domain, admission == Admission::Probe);

            attempts += 1;
            let outcome = attempt(attempts).await;
            let error = classify(&outcome);

            let breaker_state = self.store.with_state(domain, |state| {
                let kind = error.as_ref().map(|e| e.kind);
                self.breaker.record(state, kind, Instant::now());
                state.record_outcome(error.is_none());
                state.breaker
            });
            probe.disarm();

            let Some(error) = error else {
                return RetryOutcome {
                    result: into_result(outcome),
                    attempts,
                    retries,
                };
            };

            if attempts >= self.max_attempts {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    domain, attempts, error
                );
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                    retries,
                };
            }

            let used = retries_by_kind.entry(error.kind).or_insert(0);
            match self.policies.decide(&error, *used, breaker_state) {
                RetryDecision::Retry { delay } => {
                    *used += 1;
                    retries += 1;
                    debug!(
                        "Retrying {} in {:?} (attempt {}, {})",
                        domain, delay, attempts, error
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp(reason) => {
                    debug!("Not retrying {} ({:?}): {}", domain, reason, error);
                    return RetryOutcome {
                        result: Err(error),
                        attempts,
                        retries,
                    };
                }
            }
        }
    }

    /// Current breaker position for a domain
    pub fn breaker_state(&self, domain: &str) -> BreakerState {
        self.store.with_state(domain, |state| state.breaker)
    }
}

/// Releases a half-open probe slot if the attempt is dropped mid-flight
///
/// Without this, a cancelled probe would leave the domain half-open with the
/// probe marked as taken forever.
struct ProbeGuard<'a> {
    store: &'a DomainStore,
    domain: &'a str,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(store: &'a DomainStore, domain: &'a str, armed: bool) -> Self {
        Self {
            store,
            domain,
            armed,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.with_state(self.domain, |state| {
                if state.breaker == BreakerState::HalfOpen {
                    state.probe_in_flight = false;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FailureKind, TransportFailure};
    use crate::retry::backoff::{Backoff, BackoffStrategy};
    use crate::retry::policy::RetryPolicy;
    use std::collections::HashMap as Map;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn response(status: u16) -> FetchOutcome {
        FetchOutcome::Response(FetchResponse {
            status,
            final_url: "https://example.com/".to_string(),
            headers: Map::new(),
            body: "<html><body>ok</body></html>".to_string(),
            truncated: false,
        })
    }

    fn network_failure() -> FetchOutcome {
        FetchOutcome::Failed(TransportFailure {
            kind: FailureKind::Connect,
            message: "connection refused".to_string(),
        })
    }

    fn create_test_manager(threshold: u32, max_attempts: u32) -> RetryManager {
        let mut policies = PolicyTable::new(Backoff::new(
            BackoffStrategy::Fixed,
            2.0,
            Duration::from_millis(50),
            0.0,
        ));
        for kind in ErrorKind::TRANSPORT_KINDS {
            let policy = policies.policy(kind);
            policies.set_policy(kind, RetryPolicy::new(policy.max_retries, Duration::from_millis(1)));
        }

        RetryManager::new(
            policies,
            CircuitBreaker::new(threshold, Duration::from_secs(60)),
            Arc::new(DomainStore::new()),
            max_attempts,
        )
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limits() {
        let manager = create_test_manager(10, 10);
        let calls = AtomicU32::new(0);

        let outcome = manager
            .execute("example.com", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        response(429)
                    } else {
                        response(200)
                    }
                }
            })
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries, 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let manager = create_test_manager(10, 10);

        let outcome = manager
            .execute("example.com", |_| async { response(404) })
            .await;

        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::ClientError);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_budget_is_per_kind() {
        let manager = create_test_manager(100, 100);

        // Unknown allows one retry, then gives up with the last error
        let outcome = manager
            .execute("example.com", |_| async {
                FetchOutcome::Failed(TransportFailure {
                    kind: FailureKind::Other,
                    message: "odd".to_string(),
                })
            })
            .await;

        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Unknown);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_max_attempts_caps_loop() {
        let manager = create_test_manager(100, 3);

        let outcome = manager
            .execute("example.com", |_| async { network_failure() })
            .await;

        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Network);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_short_circuits() {
        let manager = create_test_manager(3, 10);
        let calls = AtomicU32::new(0);

        let outcome = manager
            .execute("down.com", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { network_failure() }
            })
            .await;

        // The third failure opens the breaker and stops retrying
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(manager.breaker_state("down.com"), BreakerState::Open);

        let next = manager
            .execute("down.com", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { response(200) }
            })
            .await;

        assert_eq!(next.result.unwrap_err().kind, ErrorKind::CircuitOpen);
        assert_eq!(next.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dropped_probe_is_released() {
        let manager = create_test_manager(1, 10);
        let store = Arc::clone(&manager.store);

        store.with_state("slow.com", |state| {
            state.breaker = BreakerState::HalfOpen;
            state.probe_in_flight = false;
        });

        let pending = manager.execute("slow.com", |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            response(200)
        });
        let _ = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert!(!store.with_state("slow.com", |state| state.probe_in_flight));
    }
}
