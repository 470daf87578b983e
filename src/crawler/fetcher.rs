//! HTTP fetcher implementation
//!
//! This module defines the transport seam the engine fetches through and the
//! reqwest-backed implementation of it:
//! - Building HTTP clients per proxy with timeouts and a redirect limit
//! - GET requests with synthesized headers
//! - Streaming body reads capped at a configured size
//! - Mapping reqwest errors onto transport failure kinds
//!
//! A transport never retries and never interprets status codes; both belong
//! to the retry manager.

use crate::config::HttpConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// A single GET request as planned by the engine
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<String>,

    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            proxy: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response received from the server, whatever its status
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,

    /// URL after following redirects
    pub final_url: String,

    /// Response headers with lowercased names
    pub headers: HashMap<String, String>,

    pub body: String,

    /// Whether the body was cut at the size cap
    pub truncated: bool,
}

impl FetchResponse {
    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Why a request produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    Proxy,
    /// The connection broke while reading the body
    Body,
    /// Redirect loop or too many redirects
    Redirect,
    Other,
}

#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of one network attempt
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Response(FetchResponse),
    Failed(TransportFailure),
}

impl FetchOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response(response) => Some(response.status),
            Self::Failed(_) => None,
        }
    }
}

/// Performs network fetches
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - Timeouts and redirect limit
/// * `proxy` - Optional proxy URL every request of this client goes through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy URL or TLS backend failure
pub fn build_http_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// [`Transport`] backed by reqwest
///
/// One client is kept per proxy so connection pools are reused.
pub struct ReqwestTransport {
    config: HttpConfig,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        let direct = build_http_client(&config, None)?;
        let mut clients = HashMap::new();
        clients.insert(None, direct);

        Ok(Self {
            config,
            clients: Mutex::new(clients),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
        let key = proxy.map(str::to_string);
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.config, proxy)?;
        self.clients.lock().insert(key, client.clone());
        Ok(client)
    }

    /// Reads the body chunk by chunk, stopping at the size cap
    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<(String, bool), reqwest::Error> {
        let cap = self.config.max_body_bytes;
        let mut bytes = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await? {
            let room = cap.saturating_sub(bytes.len());
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok((String::from_utf8_lossy(&bytes).into_owned(), truncated))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let client = match self.client_for(request.proxy.as_deref()) {
            Ok(client) => client,
            Err(e) => {
                return FetchOutcome::Failed(TransportFailure {
                    kind: FailureKind::Proxy,
                    message: format!("Invalid proxy: {}", e),
                })
            }
        };

        let mut builder = client
            .get(request.url.clone())
            .headers(header_map(&request.headers));
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        trace!("GET {} via {:?}", request.url, request.proxy);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Failed(failure_from(&e, request.proxy.is_some())),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        match self.read_body(response).await {
            Ok((body, truncated)) => FetchOutcome::Response(FetchResponse {
                status,
                final_url,
                headers,
                body,
                truncated,
            }),
            Err(e) => FetchOutcome::Failed(TransportFailure {
                kind: if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Body
                },
                message: format!("Failed to read body: {}", e),
            }),
        }
    }
}

/// Converts header pairs, skipping names or values reqwest rejects
fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}

/// Classifies a reqwest send error
fn failure_from(error: &reqwest::Error, via_proxy: bool) -> TransportFailure {
    let kind = if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_redirect() {
        FailureKind::Redirect
    } else if error.is_connect() && via_proxy {
        FailureKind::Proxy
    } else if error.is_connect() {
        FailureKind::Connect
    } else if error.is_body() || error.is_decode() {
        FailureKind::Body
    } else {
        FailureKind::Other
    };

    TransportFailure {
        kind,
        message: error.to_string(),
    }
}
