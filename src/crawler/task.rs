//! Tasks, per-request options and results

use crate::classifier::PageType;
use crate::extract::{Enrichment, Fields};
use crate::retry::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// Caller options for a single URL
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Skip classification and use this type's extractor
    pub page_type: Option<PageType>,

    /// Consult and populate the response cache
    pub use_cache: bool,

    /// Extra request headers; they override generated ones
    pub headers: Vec<(String, String)>,

    /// Render the page through the configured renderer before extracting
    pub render: bool,

    /// Higher values are claimed first
    pub priority: i32,

    /// Opaque caller data echoed into the result
    pub metadata: BTreeMap<String, String>,

    /// Overrides the engine's task timeout
    pub timeout: Option<Duration>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            page_type: None,
            use_cache: true,
            headers: Vec::new(),
            render: false,
            priority: 0,
            metadata: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ScrapeOptions {
    pub fn with_page_type(mut self, page_type: PageType) -> Self {
        self.page_type = Some(page_type);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Why a URL produced no content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Final output for one URL
///
/// Exactly one of `content` and `error` is populated: a failed task carries an
/// empty content map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub final_url: Option<String>,
    pub domain: String,
    pub page_type: PageType,
    pub classification_confidence: f64,
    pub extraction_success: bool,
    pub extraction_confidence: f64,
    pub extractor: Option<String>,
    pub strategies_run: Vec<String>,
    pub text_method: Option<String>,
    pub content: Fields,
    pub enrichment: Option<Enrichment>,
    pub enrichment_error: Option<String>,
    pub from_cache: bool,
    pub rendered: bool,

    /// Why a requested render did not happen
    #[serde(default)]
    pub render_error: Option<String>,
    pub status_code: Option<u16>,

    /// Network attempts made for this result
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<ScrapeError>,
    pub metadata: BTreeMap<String, String>,
}

impl ScrapeResult {
    pub fn new(url: &str, domain: &str) -> Self {
        Self {
            url: url.to_string(),
            final_url: None,
            domain: domain.to_string(),
            page_type: PageType::Unknown,
            classification_confidence: 0.0,
            extraction_success: false,
            extraction_confidence: 0.0,
            extractor: None,
            strategies_run: Vec::new(),
            text_method: None,
            content: Fields::new(),
            enrichment: None,
            enrichment_error: None,
            from_cache: false,
            rendered: false,
            render_error: None,
            status_code: None,
            attempts: 0,
            elapsed_ms: 0,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A failed result; any content gathered so far is dropped
    pub fn failed(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.content.clear();
        self.extraction_success = false;
        self.error = Some(ScrapeError {
            kind,
            message: message.into(),
        });
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// A queued unit of work
///
/// Owned by the queue until a worker claims it; the result goes back to the
/// submitter through `reply`.
#[derive(Debug)]
pub struct CrawlTask {
    pub id: u64,
    pub url: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub options: ScrapeOptions,
    pub reply: oneshot::Sender<ScrapeResult>,
}
