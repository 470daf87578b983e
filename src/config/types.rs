use crate::antidetect::ProxyStrategy;
use crate::retry::BackoffStrategy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sumi-Sieve
///
/// Every section is optional in the TOML file; missing sections and keys fall
/// back to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub proxy: ProxyConfig,
    pub retry: RetryConfig,
    #[serde(rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
    pub extraction: ExtractionConfig,
    pub http: HttpConfig,
}

/// Worker pool, queue and housekeeping configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Maximum number of fetches in flight across all domains
    pub max_concurrency: usize,

    /// Maximum number of fetches in flight against a single domain
    pub per_domain_concurrency: usize,

    /// Number of workers pulling tasks from the queue
    pub worker_count: usize,

    /// Maximum number of queued tasks before submissions are rejected
    pub queue_capacity: usize,

    /// Per-task deadline covering fetch, retries and extraction (milliseconds)
    pub task_timeout_ms: u64,

    /// Upper bound on fetch attempts for a single task
    pub max_attempts: u32,

    /// Interval between housekeeping passes (milliseconds)
    pub housekeeping_interval_ms: u64,

    /// Also run housekeeping after this many completed tasks
    pub housekeeping_every_tasks: u64,

    /// Fraction of total memory above which the cache is forcibly shrunk
    pub memory_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            per_domain_concurrency: 3,
            worker_count: 10,
            queue_capacity: 1000,
            task_timeout_ms: 120_000,
            max_attempts: 6,
            housekeeping_interval_ms: 60_000,
            housekeeping_every_tasks: 100,
            memory_threshold: 0.8,
        }
    }
}

impl EngineConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }
}

/// Adaptive per-domain request pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Target requests per second against a single domain
    pub target_rate: f64,

    /// Lower clamp for the computed delay (milliseconds)
    pub min_delay_ms: u64,

    /// Upper clamp for the computed delay (milliseconds)
    pub max_delay_ms: u64,

    /// Rolling success rate below which the delay is stretched
    pub success_threshold: f64,

    /// Maximum requests per domain per hour
    pub hourly_cap: u32,

    /// Whether to add +/-30% jitter to the delay
    pub jitter: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            target_rate: 1.0,
            min_delay_ms: 500,
            max_delay_ms: 30_000,
            success_threshold: 0.95,
            hourly_cap: 1000,
            jitter: true,
        }
    }
}

/// User agent rotation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Number of requests to a domain before its user agent is rotated
    pub rotate_every: u32,

    /// Probability of picking a desktop agent on rotation
    pub desktop_ratio: f64,

    /// Desktop user agent pool (empty means the built-in pool)
    pub desktop: Vec<String>,

    /// Mobile user agent pool (empty means the built-in pool)
    pub mobile: Vec<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            rotate_every: 10,
            desktop_ratio: 0.7,
            desktop: Vec::new(),
            mobile: Vec::new(),
        }
    }
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Proxy URLs (e.g. "http://10.0.0.1:3128")
    pub proxies: Vec<String>,

    /// How a proxy is picked for each request
    pub strategy: ProxyStrategy,

    /// Interval between background health checks (milliseconds, 0 disables)
    pub health_check_interval_ms: u64,

    /// URL fetched through each proxy during a health check
    pub health_check_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            strategy: ProxyStrategy::RoundRobin,
            health_check_interval_ms: 300_000,
            health_check_url: "https://example.com/".to_string(),
        }
    }
}

/// Backoff configuration shared by all error kinds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub strategy: BackoffStrategy,

    /// Multiplier for the exponential strategy
    pub factor: f64,

    /// Upper clamp for any computed backoff (milliseconds)
    pub max_delay_ms: u64,

    /// Jitter ratio applied symmetrically to every backoff (0.0 disables)
    pub jitter: f64,

    /// Per error kind overrides, keyed by kind name (e.g. "rate_limit")
    pub policies: BTreeMap<String, KindPolicyConfig>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            factor: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.1,
            policies: BTreeMap::new(),
        }
    }
}

/// Override for a single error kind's retry budget
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KindPolicyConfig {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

/// Per-domain circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,

    /// Time after the last failure before a probe is allowed (milliseconds)
    pub recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,

    /// Time to live for cached results (seconds)
    pub ttl_secs: u64,

    /// Maximum number of in-memory entries before LRU eviction
    pub max_entries: usize,

    /// Directory for disk-backed entries (none keeps the cache in memory)
    pub directory: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 10_000,
            directory: None,
        }
    }
}

/// Page classifier weights and threshold
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    /// Best score below which the page is reported as unknown
    pub threshold: f64,
    pub url_weight: f64,
    pub keyword_weight: f64,
    pub selector_weight: f64,
    pub meta_weight: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            url_weight: 0.25,
            keyword_weight: 0.20,
            selector_weight: 0.35,
            meta_weight: 0.20,
        }
    }
}

/// Extraction selection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Specialized extractor confidence below which the general extractor is used
    pub fallback_threshold: f64,

    /// Extraction confidence below which a configured renderer is tried
    pub render_threshold: f64,

    /// Deadline for a single enrichment oracle call (milliseconds)
    pub oracle_timeout_ms: u64,

    /// Use the built-in keyword and summary oracle when none is injected
    pub enrich: bool,

    pub method_weight: f64,
    pub length_weight: f64,
    pub structure_weight: f64,
    pub language_weight: f64,

    /// Word count range considered ideal for main text
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: 0.5,
            render_threshold: 0.3,
            oracle_timeout_ms: 10_000,
            enrich: false,
            method_weight: 0.30,
            length_weight: 0.30,
            structure_weight: 0.20,
            language_weight: 0.10,
            min_words: 50,
            max_words: 5000,
        }
    }
}

impl ExtractionConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_redirects: usize,

    /// Bodies larger than this are truncated during the streaming read
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_redirects: 10,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
