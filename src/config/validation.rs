use crate::config::types::{
    CacheConfig, CircuitBreakerConfig, ClassifierConfig, Config, EngineConfig, ExtractionConfig,
    HttpConfig, ProxyConfig, RateLimitConfig, RetryConfig, UserAgentConfig,
};
use crate::retry::ErrorKind;
use crate::ConfigError;
use std::str::FromStr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_proxy_config(&config.proxy)?;
    validate_retry_config(&config.retry)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_cache_config(&config.cache)?;
    validate_classifier_config(&config.classifier)?;
    validate_extraction_config(&config.extraction)?;
    validate_http_config(&config.http)?;
    Ok(())
}

fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 1000, got {}",
            config.max_concurrency
        )));
    }

    if config.per_domain_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "per_domain_concurrency must be >= 1, got {}",
            config.per_domain_concurrency
        )));
    }

    if config.worker_count < 1 {
        return Err(ConfigError::Validation(
            "worker_count must be >= 1".to_string(),
        ));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "queue_capacity must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.task_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "task_timeout_ms must be > 0".to_string(),
        ));
    }

    validate_fraction("memory_threshold", config.memory_threshold)?;
    if config.memory_threshold == 0.0 {
        return Err(ConfigError::Validation(
            "memory_threshold must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if !(config.target_rate > 0.0) {
        return Err(ConfigError::Validation(format!(
            "target_rate must be > 0, got {}",
            config.target_rate
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    validate_fraction("success_threshold", config.success_threshold)?;

    if config.hourly_cap < 1 {
        return Err(ConfigError::Validation(
            "hourly_cap must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.rotate_every < 1 {
        return Err(ConfigError::Validation(
            "rotate_every must be >= 1".to_string(),
        ));
    }

    validate_fraction("desktop_ratio", config.desktop_ratio)?;

    if let Some(agent) = config
        .desktop
        .iter()
        .chain(config.mobile.iter())
        .find(|agent| agent.trim().is_empty())
    {
        return Err(ConfigError::Validation(format!(
            "user agent strings cannot be blank, got '{}'",
            agent
        )));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.proxies {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must use http, https or socks5",
                proxy
            )));
        }
    }

    if !config.proxies.is_empty() {
        Url::parse(&config.health_check_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid health_check_url: {}", e))
        })?;
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry factor must be >= 1.0, got {}",
            config.factor
        )));
    }

    if !(0.0..1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "retry jitter must be in [0, 1), got {}",
            config.jitter
        )));
    }

    for name in config.policies.keys() {
        let kind = ErrorKind::from_str(name).map_err(ConfigError::Validation)?;
        if !kind.is_transport_kind() {
            return Err(ConfigError::Validation(format!(
                "retry policy cannot be set for '{}'",
                name
            )));
        }
    }

    Ok(())
}

fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure_threshold must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.max_entries < 1 {
        return Err(ConfigError::Validation(
            "cache max_entries must be >= 1".to_string(),
        ));
    }

    if let Some(directory) = &config.directory {
        if directory.is_empty() {
            return Err(ConfigError::Validation(
                "cache directory cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    validate_fraction("classifier threshold", config.threshold)?;
    validate_weights(
        "classifier",
        &[
            config.url_weight,
            config.keyword_weight,
            config.selector_weight,
            config.meta_weight,
        ],
    )
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    validate_fraction("fallback_threshold", config.fallback_threshold)?;
    validate_fraction("render_threshold", config.render_threshold)?;

    if config.min_words >= config.max_words {
        return Err(ConfigError::Validation(format!(
            "min_words ({}) must be below max_words ({})",
            config.min_words, config.max_words
        )));
    }

    validate_weights(
        "extraction",
        &[
            config.method_weight,
            config.length_weight,
            config.structure_weight,
            config.language_weight,
        ],
    )
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 || config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "http timeouts must be > 0".to_string(),
        ));
    }

    if config.max_body_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_body_bytes must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a value lies in [0, 1]
fn validate_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Weights must be non-negative and not all zero
fn validate_weights(name: &str, weights: &[f64]) -> Result<(), ConfigError> {
    if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
        return Err(ConfigError::Validation(format!(
            "{} weights must be finite and non-negative",
            name
        )));
    }

    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} weights cannot all be zero",
            name
        )));
    }

    Ok(())
}
