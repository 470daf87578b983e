//! Proxy pool with selection strategies and background health checks

use crate::crawler::{FetchOutcome, FetchRequest, Transport};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// How a proxy is chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyStrategy {
    #[default]
    RoundRobin,
    Random,
    /// Weighted by success rate and latency
    QualityWeighted,
}

/// Health and performance of a single proxy
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub url: String,
    pub successes: u64,
    pub failures: u64,
    pub last_latency_ms: Option<u64>,
    pub healthy: bool,
}

impl ProxyStats {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            successes: 0,
            failures: 0,
            last_latency_ms: None,
            healthy: true,
        }
    }

    /// Success rate; an unused proxy is assumed good
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// success_rate * 1000 / (latency_ms + 1)
    pub fn quality(&self) -> f64 {
        let latency = self.last_latency_ms.unwrap_or(0) as f64;
        self.success_rate() * 1000.0 / (latency + 1.0)
    }
}

/// Shared pool of outbound proxies
#[derive(Debug)]
pub struct ProxyPool {
    proxies: Mutex<Vec<ProxyStats>>,
    strategy: ProxyStrategy,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(proxies: &[String], strategy: ProxyStrategy) -> Self {
        Self {
            proxies: Mutex::new(proxies.iter().map(|p| ProxyStats::new(p)).collect()),
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.lock().is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.proxies.lock().iter().filter(|p| p.healthy).count()
    }

    /// Picks a healthy proxy, or `None` when the pool has none to offer
    pub fn select(&self) -> Option<String> {
        let proxies = self.proxies.lock();
        let healthy: Vec<&ProxyStats> = proxies.iter().filter(|p| p.healthy).collect();

        if healthy.is_empty() {
            if !proxies.is_empty() {
                warn!("All {} proxies are unhealthy, connecting directly", proxies.len());
            }
            return None;
        }

        let chosen = match self.strategy {
            ProxyStrategy::RoundRobin => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
                healthy[index]
            }
            ProxyStrategy::Random => healthy[rand::thread_rng().gen_range(0..healthy.len())],
            ProxyStrategy::QualityWeighted => {
                let sample = rand::thread_rng().gen::<f64>();
                weighted_pick(&healthy, sample)
            }
        };

        Some(chosen.url.clone())
    }

    pub fn record_success(&self, proxy: &str, latency: Duration) {
        if let Some(stats) = self.proxies.lock().iter_mut().find(|p| p.url == proxy) {
            stats.successes += 1;
            stats.last_latency_ms = Some(latency.as_millis() as u64);
        }
    }

    pub fn record_failure(&self, proxy: &str) {
        if let Some(stats) = self.proxies.lock().iter_mut().find(|p| p.url == proxy) {
            stats.failures += 1;
        }
    }

    /// Marks a proxy healthy or unhealthy; returns whether the flag changed
    pub fn set_health(&self, proxy: &str, healthy: bool) -> bool {
        match self.proxies.lock().iter_mut().find(|p| p.url == proxy) {
            Some(stats) if stats.healthy != healthy => {
                stats.healthy = healthy;
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Vec<ProxyStats> {
        self.proxies.lock().clone()
    }

    /// Probes every proxy once through the transport
    ///
    /// A proxy is healthy when the probe comes back with a non-5xx response.
    pub async fn check_health(&self, transport: &dyn Transport, probe_url: &Url) {
        let urls: Vec<String> = self.proxies.lock().iter().map(|p| p.url.clone()).collect();

        for proxy in urls {
            let request = FetchRequest::new(probe_url.clone()).with_proxy(Some(proxy.clone()));
            let started = Instant::now();
            let outcome = transport.fetch(&request).await;

            let healthy = match &outcome {
                FetchOutcome::Response(response) => response.status < 500,
                FetchOutcome::Failed(_) => false,
            };

            if healthy {
                self.record_success(&proxy, started.elapsed());
            } else {
                self.record_failure(&proxy);
            }

            if self.set_health(&proxy, healthy) {
                if healthy {
                    info!("Proxy {} is healthy again", proxy);
                } else {
                    warn!("Proxy {} failed its health check", proxy);
                }
            } else {
                debug!("Proxy {} health unchanged (healthy = {})", proxy, healthy);
            }
        }
    }
}

/// Runs [`ProxyPool::check_health`] every `interval` until cancelled
pub fn spawn_health_checker(
    pool: Arc<ProxyPool>,
    transport: Arc<dyn Transport>,
    probe_url: Url,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => pool.check_health(transport.as_ref(), &probe_url).await,
            }
        }
        debug!("Proxy health checker stopped");
    })
}

/// Picks from `candidates` proportionally to their quality; `sample` in [0, 1)
fn weighted_pick<'a>(candidates: &[&'a ProxyStats], sample: f64) -> &'a ProxyStats {
    let weights: Vec<f64> = candidates.iter().map(|p| p.quality().max(0.0)).collect();
    let total: f64 = weights.iter().sum();

    if total <= 0.0 {
        let index = ((sample * candidates.len() as f64) as usize).min(candidates.len() - 1);
        return candidates[index];
    }

    let mut target = sample * total;
    for (candidate, weight) in candidates.iter().zip(&weights) {
        if target < *weight {
            return candidate;
        }
        target -= weight;
    }
    candidates[candidates.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FailureKind, FetchResponse, TransportFailure};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    fn pool(strategy: ProxyStrategy) -> ProxyPool {
        ProxyPool::new(
            &[
                "http://10.0.0.1:3128".to_string(),
                "http://10.0.0.2:3128".to_string(),
                "http://10.0.0.3:3128".to_string(),
            ],
            strategy,
        )
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        let pool = ProxyPool::new(&[], ProxyStrategy::RoundRobin);
        assert!(pool.is_empty());
        assert!(pool.select().is_none());
    }

    #[test]
    fn test_round_robin_cycles() {
        let pool = pool(ProxyStrategy::RoundRobin);
        let picks: Vec<String> = (0..6).filter_map(|_| pool.select()).collect();

        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        let distinct: HashSet<&String> = picks.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_unhealthy_never_selected() {
        for strategy in [
            ProxyStrategy::RoundRobin,
            ProxyStrategy::Random,
            ProxyStrategy::QualityWeighted,
        ] {
            let pool = pool(strategy);
            assert!(pool.set_health("http://10.0.0.2:3128", false));
            assert!(!pool.set_health("http://10.0.0.2:3128", false));

            for _ in 0..50 {
                assert_ne!(pool.select().unwrap(), "http://10.0.0.2:3128");
            }
        }
    }

    #[test]
    fn test_all_unhealthy_goes_direct() {
        let pool = pool(ProxyStrategy::Random);
        for stats in pool.snapshot() {
            pool.set_health(&stats.url, false);
        }
        assert_eq!(pool.healthy_count(), 0);
        assert!(pool.select().is_none());
    }

    #[test]
    fn test_quality_score() {
        let mut stats = ProxyStats::new("http://p");
        assert_eq!(stats.quality(), 1000.0);

        stats.successes = 3;
        stats.failures = 1;
        stats.last_latency_ms = Some(99);
        assert!((stats.quality() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_pick_prefers_quality() {
        let mut fast = ProxyStats::new("http://fast");
        fast.last_latency_ms = Some(9);
        let mut slow = ProxyStats::new("http://slow");
        slow.last_latency_ms = Some(989);

        let candidates = [&fast, &slow];
        // fast weighs 100, slow weighs 1
        assert_eq!(weighted_pick(&candidates, 0.0).url, "http://fast");
        assert_eq!(weighted_pick(&candidates, 0.98).url, "http://fast");
        assert_eq!(weighted_pick(&candidates, 0.995).url, "http://slow");
    }

    struct ScriptedTransport {
        failing: HashSet<String>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            let proxy = request.proxy.clone().unwrap_or_default();
            if self.failing.contains(&proxy) {
                FetchOutcome::Failed(TransportFailure {
                    kind: FailureKind::Proxy,
                    message: "proxy refused".to_string(),
                })
            } else {
                FetchOutcome::Response(FetchResponse {
                    status: 200,
                    final_url: request.url.to_string(),
                    headers: HashMap::new(),
                    body: "ok".to_string(),
                    truncated: false,
                })
            }
        }
    }

    #[tokio::test]
    async fn test_health_check_marks_and_restores() {
        let pool = pool(ProxyStrategy::RoundRobin);
        let probe = Url::parse("https://example.com/").unwrap();

        let mut transport = ScriptedTransport {
            failing: HashSet::from(["http://10.0.0.1:3128".to_string()]),
        };
        pool.check_health(&transport, &probe).await;
        assert_eq!(pool.healthy_count(), 2);

        transport.failing.clear();
        pool.check_health(&transport, &probe).await;
        assert_eq!(pool.healthy_count(), 3);

        let stats = pool.snapshot();
        assert_eq!(stats[0].failures, 1);
        assert_eq!(stats[0].successes, 1);
    }
}
