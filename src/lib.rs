//! Sumi-Sieve: an adaptive crawl-and-extract engine
//!
//! This crate fetches web pages politely and resiliently, classifies what kind of
//! page each one is, and extracts structured content from it. The moving parts are:
//!
//! - [`classifier`]: page-type scoring against an open signature registry
//! - [`extract`]: extraction strategies, main-text selection and enrichment
//! - [`antidetect`]: adaptive delays, user-agent and proxy rotation, header synthesis
//! - [`retry`]: error taxonomy, backoff and the per-domain circuit breaker
//! - [`cache`]: TTL response cache with optional disk persistence
//! - [`crawler`]: the bounded-concurrency engine tying everything together

pub mod antidetect;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod retry;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Sieve operations
///
/// Per-URL failures never show up here: they are reported inside
/// [`crawler::ScrapeResult::error`]. This type covers engine-level problems such
/// as a full queue or a misconfigured engine.
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Engine is not running")]
    NotRunning,

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Engine has been stopped and cannot be restarted")]
    Stopped,

    #[error("Task for {url} was dropped before completing")]
    TaskDropped { url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SieveError {
    /// The error kind reported when this error stands in for a per-URL result
    pub fn kind(&self) -> ErrorKind {
        match self {
            SieveError::QueueFull { .. } => ErrorKind::QueueFull,
            SieveError::UrlError(_) => ErrorKind::InvalidUrl,
            SieveError::NotRunning | SieveError::Stopped | SieveError::TaskDropped { .. } => {
                ErrorKind::Cancelled
            }
            _ => ErrorKind::Unknown,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Sieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use classifier::{ClassificationResult, PageClassifier, PageType};
pub use config::Config;
pub use crawler::{Engine, EngineBuilder, ScrapeOptions, ScrapeResult};
pub use retry::ErrorKind;
pub use state::{DomainState, DomainStore};
pub use url::{extract_domain, normalize_url};
