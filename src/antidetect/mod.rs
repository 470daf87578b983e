//! Anti-detection layer
//!
//! Decides, for every outgoing request, how long to wait, which user agent and
//! proxy to use, and which headers to send. Pacing adapts to each domain's
//! recent success rate and hourly volume.

mod headers;
mod proxy;
mod user_agents;

pub use headers::{build_headers, header_value};
pub use proxy::{spawn_health_checker, ProxyPool, ProxyStats, ProxyStrategy};
pub use user_agents::UserAgentPool;

use crate::config::{Config, RateLimitConfig};
use crate::state::{DomainStore, VOLUME_WINDOW};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;
use url::Url;

/// Fraction of the hourly cap at which pacing slows down
const HOURLY_PRESSURE: f64 = 0.8;
const HOURLY_PRESSURE_FACTOR: f64 = 1.5;
const JITTER_RATIO: f64 = 0.3;

/// Everything the transport needs to disguise one request
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub headers: Vec<(String, String)>,

    /// How long to wait before sending
    pub delay: Duration,
}

/// Computes the polite spacing between requests to one domain
///
/// # Arguments
///
/// * `config` - Pacing configuration
/// * `success_rate` - Rolling success rate of the domain
/// * `requests_last_hour` - Requests already sent to the domain this hour
/// * `jitter_sample` - Value in [-1, 1] scaled to +/-30% when jitter is enabled
pub fn compute_delay(
    config: &RateLimitConfig,
    success_rate: f64,
    requests_last_hour: usize,
    jitter_sample: f64,
) -> Duration {
    let mut delay_ms = 1000.0 / config.target_rate;

    if success_rate < config.success_threshold {
        delay_ms *= 2.0 - success_rate.clamp(0.0, 1.0);
    }

    if requests_last_hour as f64 >= config.hourly_cap as f64 * HOURLY_PRESSURE {
        delay_ms *= HOURLY_PRESSURE_FACTOR;
    }

    delay_ms = delay_ms.clamp(config.min_delay_ms as f64, config.max_delay_ms as f64);

    if config.jitter {
        delay_ms *= 1.0 + JITTER_RATIO * jitter_sample.clamp(-1.0, 1.0);
    }

    Duration::from_nanos((delay_ms.max(0.0) * 1_000_000.0).round() as u64)
}

/// Per-request disguise and pacing
pub struct AntiDetection {
    rate_limit: RateLimitConfig,
    agents: UserAgentPool,
    proxies: Arc<ProxyPool>,
    store: Arc<DomainStore>,
}

impl AntiDetection {
    pub fn new(
        rate_limit: RateLimitConfig,
        agents: UserAgentPool,
        proxies: Arc<ProxyPool>,
        store: Arc<DomainStore>,
    ) -> Self {
        Self {
            rate_limit,
            agents,
            proxies,
            store,
        }
    }

    pub fn from_config(config: &Config, store: Arc<DomainStore>) -> Self {
        Self::new(
            config.rate_limit.clone(),
            UserAgentPool::from_config(&config.user_agent),
            Arc::new(ProxyPool::new(&config.proxy.proxies, config.proxy.strategy)),
            store,
        )
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    /// Plans one request to `url`
    ///
    /// The domain's next request slot is reserved here, so concurrent tasks
    /// against the same domain receive increasing delays instead of all
    /// firing at once. Once the hourly cap is reached, the delay also covers
    /// the time until the oldest request of the hour falls out of the window.
    pub fn prepare_request(
        &self,
        url: &Url,
        domain: &str,
        custom_headers: &[(String, String)],
    ) -> RequestPlan {
        let mut rng = rand::thread_rng();
        let jitter_sample = rng.gen_range(-1.0..=1.0);
        let now = Instant::now();

        let (user_agent, delay) = self.store.with_state(domain, |state| {
            let hourly = state.requests_in_last_hour(now);
            let spacing = compute_delay(&self.rate_limit, state.success_rate(), hourly, jitter_sample);
            let mut delay = state.reserve_slot(now, spacing);

            if hourly >= self.rate_limit.hourly_cap as usize {
                if let Some(oldest) = state.request_times.front() {
                    let frees_at = *oldest + VOLUME_WINDOW;
                    delay = delay.max(frees_at.saturating_duration_since(now));
                }
            }

            let user_agent = self.agents.agent_for(state, &mut rng);
            state.record_request(now + delay);
            (user_agent, delay)
        });

        let proxy = self.proxies.select();
        let headers = build_headers(&user_agent, url, custom_headers, &mut rng);

        trace!(
            "Planned request to {}: delay {:?}, proxy {:?}",
            url,
            delay,
            proxy
        );

        RequestPlan {
            user_agent,
            proxy,
            headers,
            delay,
        }
    }

    /// Feeds a finished request back into the proxy statistics
    pub fn record_proxy_result(&self, proxy: Option<&str>, success: bool, latency: Duration) {
        if let Some(proxy) = proxy {
            if success {
                self.proxies.record_success(proxy, latency);
            } else {
                self.proxies.record_failure(proxy);
            }
        }
    }
}
