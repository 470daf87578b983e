use crate::config::RetryConfig;
use crate::retry::errors::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// `base * factor^(n - 1)`
    #[default]
    Exponential,
    /// `base * n`
    Linear,
    /// `base * fib(n)` with fib(1) = fib(2) = 1
    Fibonacci,
    /// `base`
    Fixed,
}

/// Backoff calculator shared by every error kind
#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: BackoffStrategy,
    factor: f64,
    max_delay: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(strategy: BackoffStrategy, factor: f64, max_delay: Duration, jitter: f64) -> Self {
        Self {
            strategy,
            factor,
            max_delay,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.strategy,
            config.factor,
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry number `retry` (1-based), with random jitter
    pub fn delay_for(&self, kind: ErrorKind, base: Duration, retry: u32) -> Duration {
        let sample = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_sample(kind, base, retry, sample)
    }

    /// Delay before retry number `retry` with a fixed jitter sample in [-1, 1]
    ///
    /// Rate limited requests wait twice as long as the schedule says. The
    /// result never exceeds the configured maximum.
    pub fn delay_with_sample(
        &self,
        kind: ErrorKind,
        base: Duration,
        retry: u32,
        sample: f64,
    ) -> Duration {
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let mut delay_ms = self.raw_delay_ms(base, retry.max(1));

        if kind == ErrorKind::RateLimit {
            delay_ms *= 2.0;
        }

        delay_ms = delay_ms.min(max_ms);
        delay_ms += delay_ms * self.jitter * sample.clamp(-1.0, 1.0);
        delay_ms = delay_ms.clamp(0.0, max_ms);

        Duration::from_nanos((delay_ms * 1_000_000.0).round() as u64)
    }

    fn raw_delay_ms(&self, base: Duration, retry: u32) -> f64 {
        let base_ms = base.as_secs_f64() * 1000.0;
        match self.strategy {
            BackoffStrategy::Exponential => {
                let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
                base_ms * self.factor.powi(exponent)
            }
            BackoffStrategy::Linear => base_ms * retry as f64,
            BackoffStrategy::Fibonacci => base_ms * fibonacci(retry),
            BackoffStrategy::Fixed => base_ms,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// fib(1) = fib(2) = 1; saturates to infinity for large `n`
fn fibonacci(n: u32) -> f64 {
    let (mut a, mut b) = (0.0_f64, 1.0_f64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
        if b.is_infinite() {
            break;
        }
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(strategy: BackoffStrategy) -> Backoff {
        Backoff::new(strategy, 2.0, Duration::from_secs(60), 0.0)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_fibonacci() {
        let values: Vec<f64> = (1..=7).map(fibonacci).collect();
        assert_eq!(values, vec![1.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0]);
    }

    #[test]
    fn test_exponential_schedule() {
        let b = backoff(BackoffStrategy::Exponential);
        let base = ms(1000);
        assert_eq!(b.delay_with_sample(ErrorKind::Network, base, 1, 0.0), ms(1000));
        assert_eq!(b.delay_with_sample(ErrorKind::Network, base, 2, 0.0), ms(2000));
        assert_eq!(b.delay_with_sample(ErrorKind::Network, base, 3, 0.0), ms(4000));
    }

    #[test]
    fn test_linear_fibonacci_fixed() {
        let base = ms(500);
        assert_eq!(
            backoff(BackoffStrategy::Linear).delay_with_sample(ErrorKind::Timeout, base, 3, 0.0),
            ms(1500)
        );
        assert_eq!(
            backoff(BackoffStrategy::Fibonacci).delay_with_sample(ErrorKind::Timeout, base, 5, 0.0),
            ms(2500)
        );
        assert_eq!(
            backoff(BackoffStrategy::Fixed).delay_with_sample(ErrorKind::Timeout, base, 9, 0.0),
            base
        );
    }

    #[test]
    fn test_rate_limit_doubles() {
        let b = backoff(BackoffStrategy::Exponential);
        assert_eq!(
            b.delay_with_sample(ErrorKind::RateLimit, ms(5000), 1, 0.0),
            ms(10_000)
        );
    }

    #[test]
    fn test_clamped_to_max() {
        let b = backoff(BackoffStrategy::Exponential);
        assert_eq!(
            b.delay_with_sample(ErrorKind::Network, ms(1000), 40, 0.0),
            Duration::from_secs(60)
        );
        // Huge exponents must not overflow into a panic
        assert_eq!(
            b.delay_with_sample(ErrorKind::RateLimit, ms(1000), u32::MAX, 1.0),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let b = Backoff::new(
            BackoffStrategy::Fixed,
            2.0,
            Duration::from_secs(60),
            0.1,
        );
        let base = ms(1000);

        assert_eq!(b.delay_with_sample(ErrorKind::Network, base, 1, 1.0), ms(1100));
        assert_eq!(b.delay_with_sample(ErrorKind::Network, base, 1, -1.0), ms(900));

        for _ in 0..100 {
            let delay = b.delay_for(ErrorKind::Network, base, 1);
            assert!(delay >= ms(900) && delay <= ms(1100), "got {:?}", delay);
        }
    }

    #[test]
    fn test_retry_zero_treated_as_first() {
        let b = backoff(BackoffStrategy::Linear);
        assert_eq!(b.delay_with_sample(ErrorKind::Network, ms(100), 0, 0.0), ms(100));
    }
}
