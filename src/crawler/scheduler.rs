//! Concurrency limits for network fetches
//!
//! This module handles:
//! - Global concurrency limiting via a shared semaphore
//! - Per-domain concurrency limiting via one semaphore per domain
//! - Releasing both permits on every exit path, including cancellation
//!
//! Pacing between requests is not handled here; the anti-detection layer
//! computes the delay and the worker sleeps before asking for permits.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Both permits needed for one fetch attempt
///
/// Dropping it releases the global permit first, then the domain permit.
pub struct FetchPermit {
    _global: OwnedSemaphorePermit,
    _domain: OwnedSemaphorePermit,
    domain: String,
}

impl FetchPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl std::fmt::Debug for FetchPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPermit")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Scheduler hands out fetch permits
///
/// The scheduler coordinates:
/// - Global concurrency limits (max fetches in flight)
/// - Per-domain concurrency limits (max fetches in flight per domain)
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    global: Arc<Semaphore>,

    /// Per-domain semaphores, created on first use
    domains: Mutex<HashMap<String, Arc<Semaphore>>>,

    global_limit: usize,
    per_domain_limit: usize,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `global_limit` - Maximum fetches in flight across all domains
    /// * `per_domain_limit` - Maximum fetches in flight against one domain
    pub fn new(global_limit: usize, per_domain_limit: usize) -> Self {
        let global_limit = global_limit.max(1);
        Self {
            global: Arc::new(Semaphore::new(global_limit)),
            domains: Mutex::new(HashMap::new()),
            global_limit,
            per_domain_limit: per_domain_limit.max(1),
        }
    }

    fn domain_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        let mut domains = self.domains.lock();
        Arc::clone(
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_domain_limit))),
        )
    }

    /// Waits for a domain permit, then a global permit
    ///
    /// # Returns
    ///
    /// * `Ok(FetchPermit)` - Both permits are held
    /// * `Err(AcquireError)` - The scheduler was closed
    pub async fn acquire(&self, domain: &str) -> Result<FetchPermit, AcquireError> {
        let domain_permit = self.domain_semaphore(domain).acquire_owned().await?;
        let global_permit = Arc::clone(&self.global).acquire_owned().await?;

        Ok(FetchPermit {
            _global: global_permit,
            _domain: domain_permit,
            domain: domain.to_string(),
        })
    }

    /// Fails every pending and future acquisition
    pub fn close(&self) {
        self.global.close();
        for semaphore in self.domains.lock().values() {
            semaphore.close();
        }
    }

    /// Number of fetches currently holding permits
    pub fn in_flight(&self) -> usize {
        self.global_limit
            .saturating_sub(self.global.available_permits())
    }

    /// Fetches in flight against `domain`
    pub fn in_flight_for(&self, domain: &str) -> usize {
        self.domains
            .lock()
            .get(domain)
            .map(|s| self.per_domain_limit.saturating_sub(s.available_permits()))
            .unwrap_or(0)
    }

    pub fn global_limit(&self) -> usize {
        self.global_limit
    }

    pub fn per_domain_limit(&self) -> usize {
        self.per_domain_limit
    }
}
