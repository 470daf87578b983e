//! Error taxonomy for fetch failures
//!
//! Every failed attempt is reduced to an [`ErrorKind`] before the retry loop
//! looks at it. The kind alone decides the retry budget, the backoff base and
//! whether the failure counts against the domain's circuit breaker.

use crate::crawler::{FailureKind, FetchOutcome, FetchResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, reset, DNS failure, broken body stream
    Network,
    /// The request did not complete in time
    Timeout,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError,
    /// HTTP 4xx other than 429
    ClientError,
    /// The response could not be used as a page
    Parsing,
    /// Anything else the transport reported
    Unknown,
    /// Rejected locally because the domain's breaker is open
    CircuitOpen,
    /// The target could not be parsed as an http(s) URL
    InvalidUrl,
    /// The task was cancelled or hit its deadline
    Cancelled,
    /// The engine queue had no room for the task
    QueueFull,
}

impl ErrorKind {
    /// Kinds produced by the transport layer, which carry a retry policy
    pub const TRANSPORT_KINDS: [ErrorKind; 7] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::ServerError,
        ErrorKind::ClientError,
        ErrorKind::Parsing,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Parsing => "parsing",
            Self::Unknown => "unknown",
            Self::CircuitOpen => "circuit_open",
            Self::InvalidUrl => "invalid_url",
            Self::Cancelled => "cancelled",
            Self::QueueFull => "queue_full",
        }
    }

    /// Whether this kind comes out of a fetch attempt (and so has a retry policy)
    pub fn is_transport_kind(&self) -> bool {
        Self::TRANSPORT_KINDS.contains(self)
    }

    /// Whether a failure of this kind moves the circuit breaker toward open
    ///
    /// Client errors and parse failures prove the server is answering, so they
    /// leave the breaker alone.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::ServerError | Self::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "network" => Ok(Self::Network),
            "timeout" => Ok(Self::Timeout),
            "rate_limit" => Ok(Self::RateLimit),
            "server_error" => Ok(Self::ServerError),
            "client_error" => Ok(Self::ClientError),
            "parsing" => Ok(Self::Parsing),
            "unknown" => Ok(Self::Unknown),
            "circuit_open" => Ok(Self::CircuitOpen),
            "invalid_url" => Ok(Self::InvalidUrl),
            "cancelled" => Ok(Self::Cancelled),
            "queue_full" => Ok(Self::QueueFull),
            other => Err(format!("Unknown error kind: '{}'", other)),
        }
    }
}

/// A classified failure of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,

    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,

    /// Server supplied `Retry-After`, if any
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn circuit_open(domain: &str) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("Circuit breaker is open for {}", domain),
        )
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// Classifies a fetch outcome, returning `None` when it is usable
///
/// # Arguments
///
/// * `outcome` - The raw outcome of a single transport call
///
/// # Returns
///
/// * `None` - A 2xx response with a body
/// * `Some(FetchError)` - The classified failure
pub fn classify(outcome: &FetchOutcome) -> Option<FetchError> {
    match outcome {
        FetchOutcome::Failed(failure) => {
            let kind = match failure.kind {
                FailureKind::Timeout => ErrorKind::Timeout,
                FailureKind::Connect | FailureKind::Proxy | FailureKind::Body => ErrorKind::Network,
                FailureKind::Redirect => ErrorKind::ClientError,
                FailureKind::Other => ErrorKind::Unknown,
            };
            Some(FetchError::new(kind, failure.message.clone()))
        }
        FetchOutcome::Response(response) => {
            let status = response.status;
            let kind = match status {
                200..=299 => {
                    if response.body.trim().is_empty() {
                        let mut error = FetchError::new(ErrorKind::Parsing, "Empty response body");
                        error.status = Some(status);
                        return Some(error);
                    }
                    return None;
                }
                429 => ErrorKind::RateLimit,
                400..=499 => ErrorKind::ClientError,
                500..=599 => ErrorKind::ServerError,
                _ => ErrorKind::Unknown,
            };

            Some(FetchError {
                kind,
                message: format!("Unexpected status {}", status),
                status: Some(status),
                retry_after: response.header("retry-after").and_then(parse_retry_after),
            })
        }
    }
}

/// Converts an outcome into the usable response or its classified failure
pub fn into_result(outcome: FetchOutcome) -> Result<FetchResponse, FetchError> {
    if let Some(error) = classify(&outcome) {
        return Err(error);
    }
    match outcome {
        FetchOutcome::Response(response) => Ok(response),
        FetchOutcome::Failed(failure) => Err(FetchError::new(ErrorKind::Unknown, failure.message)),
    }
}

/// Parses a `Retry-After` header given in seconds
///
/// HTTP-date values are ignored; the backoff schedule covers those servers.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
