//! Retry module: error taxonomy, backoff and the circuit breaker
//!
//! # Components
//!
//! - `ErrorKind` / `FetchError`: classification of failed attempts
//! - `Backoff`: exponential, linear, fibonacci and fixed schedules
//! - `PolicyTable`: per-kind budgets and the pure retry decision
//! - `CircuitBreaker`: closed / open / half-open per domain
//! - `RetryManager`: the loop that ties them together

mod backoff;
mod circuit;
mod errors;
mod manager;
mod policy;

pub use backoff::{Backoff, BackoffStrategy};
pub use circuit::{Admission, CircuitBreaker};
pub use errors::{classify, into_result, parse_retry_after, ErrorKind, FetchError};
pub use manager::{RetryManager, RetryOutcome};
pub use policy::{GiveUpReason, PolicyTable, RetryDecision, RetryPolicy};
