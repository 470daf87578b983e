//! Crawl engine - task orchestration
//!
//! This module contains the worker loop that coordinates every stage of a
//! scrape:
//! - Queueing submitted URLs and handing them to a fixed worker group
//! - Serving fresh results from the response cache
//! - Pacing, disguising and permitting each network attempt
//! - Retrying through the per-domain circuit breaker
//! - Classifying, extracting and enriching the fetched page
//! - Stopping cleanly, failing whatever is still queued

use crate::antidetect::{spawn_health_checker, AntiDetection};
use crate::cache::ResponseCache;
use crate::classifier::{ClassificationResult, PageClassifier, PageType};
use crate::config::{validate, Config};
use crate::crawler::housekeeping::{Housekeeper, MemoryProbe, SystemMemory};
use crate::crawler::monitor::{EngineStats, PerformanceMonitor};
use crate::crawler::queue::TaskQueue;
use crate::crawler::scheduler::Scheduler;
use crate::crawler::{
    CrawlTask, FailureKind, FetchOutcome, FetchRequest, ReqwestTransport, Renderer, ScrapeError,
    ScrapeOptions, ScrapeResult, Transport, TransportFailure,
};
use crate::extract::{
    EnrichmentOracle, EnrichmentStatus, Extraction, ExtractionSelector, ExtractorRegistry,
    FrequencyOracle,
};
use crate::retry::{ErrorKind, RetryManager};
use crate::state::DomainStore;
use crate::url::parse_target;
use crate::SieveError;
use chrono::Utc;
use futures::stream::{FuturesUnordered, Stream};
use parking_lot::Mutex;
use scraper::Html;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds an [`Engine`] with injected collaborators
///
/// Anything not supplied falls back to the crate's own implementation: the
/// reqwest transport, the built-in page signatures and extractors, and no
/// renderer. Without an injected oracle, `[extraction] enrich = true` selects
/// the built-in [`FrequencyOracle`].
pub struct EngineBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    renderer: Option<Arc<dyn Renderer>>,
    oracle: Option<Arc<dyn EnrichmentOracle>>,
    classifier: Option<PageClassifier>,
    extractors: Option<ExtractorRegistry>,
    memory: Option<Arc<dyn MemoryProbe>>,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            renderer: None,
            oracle: None,
            classifier: None,
            extractors: None,
            memory: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn EnrichmentOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn classifier(mut self, classifier: PageClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = Some(extractors);
        self
    }

    pub fn memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Validates the configuration and assembles the engine
    ///
    /// # Returns
    ///
    /// * `Ok(Engine)` - A stopped engine; call [`Engine::start`] before submitting
    /// * `Err(SieveError)` - Invalid configuration or HTTP client setup failure
    pub fn build(self) -> Result<Engine, SieveError> {
        validate(&self.config)?;
        let config = self.config;

        let store = Arc::new(DomainStore::new());
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.http.clone())?),
        };
        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => PageClassifier::new(config.classifier.clone())?,
        };

        let mut selector = ExtractionSelector::new(
            self.extractors.unwrap_or_else(ExtractorRegistry::with_defaults),
            &config.extraction,
        );
        let oracle = self.oracle.or_else(|| {
            config
                .extraction
                .enrich
                .then(|| Arc::new(FrequencyOracle::default()) as Arc<dyn EnrichmentOracle>)
        });
        if let Some(oracle) = oracle {
            selector = selector.with_oracle(oracle);
        }

        let cache = Arc::new(ResponseCache::from_config(&config.cache));
        let memory: Arc<dyn MemoryProbe> = match self.memory {
            Some(memory) => memory,
            None => Arc::new(SystemMemory::new()),
        };
        let housekeeper = Arc::new(Housekeeper::new(
            Arc::clone(&cache),
            memory,
            config.engine.memory_threshold,
        ));

        let inner = EngineInner {
            queue: TaskQueue::new(config.engine.queue_capacity),
            scheduler: Scheduler::new(
                config.engine.max_concurrency,
                config.engine.per_domain_concurrency,
            ),
            anti_detection: AntiDetection::from_config(&config, Arc::clone(&store)),
            retry: RetryManager::from_config(&config, Arc::clone(&store)),
            classifier: Arc::new(classifier),
            selector: Arc::new(selector),
            cache,
            transport,
            renderer: self.renderer,
            monitor: PerformanceMonitor::new(),
            housekeeper,
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            store,
            config,
        };

        Ok(Engine {
            inner: Arc::new(inner),
            lifecycle: Mutex::new(Lifecycle::Created),
            handles: Mutex::new(Vec::new()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Everything shared between the engine handle and its workers
struct EngineInner {
    config: Config,
    queue: TaskQueue,
    scheduler: Scheduler,
    store: Arc<DomainStore>,
    anti_detection: AntiDetection,
    retry: RetryManager,
    classifier: Arc<PageClassifier>,
    selector: Arc<ExtractionSelector>,
    cache: Arc<ResponseCache>,
    transport: Arc<dyn Transport>,
    renderer: Option<Arc<dyn Renderer>>,
    monitor: PerformanceMonitor,
    housekeeper: Arc<Housekeeper>,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

/// The page type and extraction produced from one HTML body
struct Analysis {
    page_type: PageType,
    classification_confidence: f64,
    extraction: Extraction,
}

/// Crawl-and-extract engine
///
/// Lifecycle is build → [`start`](Engine::start) → [`stop`](Engine::stop).
/// A stopped engine cannot be restarted.
pub struct Engine {
    inner: Arc<EngineInner>,
    lifecycle: Mutex<Lifecycle>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

enum Enqueued {
    Queued(oneshot::Receiver<ScrapeResult>),
    Ready(ScrapeResult),
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Spawns the worker group and the background maintenance tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SieveError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return Err(SieveError::AlreadyRunning),
            Lifecycle::Stopped => return Err(SieveError::Stopped),
            Lifecycle::Created => {}
        }

        let inner = &self.inner;
        let engine = &inner.config.engine;
        let mut handles = self.handles.lock();

        for worker_id in 0..engine.worker_count {
            handles.push(tokio::spawn(run_worker(Arc::clone(inner), worker_id)));
        }

        if engine.housekeeping_interval_ms > 0 {
            handles.push(
                Arc::clone(&inner.housekeeper)
                    .spawn(engine.housekeeping_interval(), inner.cancel.clone()),
            );
        }

        let proxy = &inner.config.proxy;
        if !inner.anti_detection.proxies().is_empty() && proxy.health_check_interval_ms > 0 {
            match Url::parse(&proxy.health_check_url) {
                Ok(probe_url) => handles.push(spawn_health_checker(
                    Arc::clone(inner.anti_detection.proxies()),
                    Arc::clone(&inner.transport),
                    probe_url,
                    Duration::from_millis(proxy.health_check_interval_ms),
                    inner.cancel.clone(),
                )),
                Err(e) => tracing::warn!(
                    "Proxy health checks disabled, bad probe URL {}: {}",
                    proxy.health_check_url,
                    e
                ),
            }
        }

        *lifecycle = Lifecycle::Running;
        tracing::info!(
            "Engine started: {} workers, global limit {}, per-domain limit {}",
            engine.worker_count,
            inner.scheduler.global_limit(),
            inner.scheduler.per_domain_limit()
        );
        Ok(())
    }

    /// Cancels in-flight work, fails queued tasks and waits for the workers
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
        }

        tracing::info!("Stopping engine");
        self.inner.cancel.cancel();
        self.inner.scheduler.close();

        self.fail_queued();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Engine task ended abnormally: {}", e);
            }
        }
        self.fail_queued();

        let stats = self.inner.monitor.snapshot();
        tracing::info!(
            "Engine stopped: {} completed, {} succeeded, {} failed",
            stats.completed,
            stats.succeeded,
            stats.failed
        );
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Scrapes one URL and waits for its result
    ///
    /// Per-URL failures come back as a [`ScrapeResult`] with `error` set.
    ///
    /// # Returns
    ///
    /// * `Ok(ScrapeResult)` - The result, successful or not
    /// * `Err(SieveError::QueueFull)` - The queue is at capacity
    /// * `Err(SieveError::NotRunning)` - The engine was not started or was stopped
    pub async fn submit(&self, url: &str, options: ScrapeOptions) -> Result<ScrapeResult, SieveError> {
        match self.enqueue(url, options)? {
            Enqueued::Ready(result) => Ok(result),
            Enqueued::Queued(receiver) => receiver.await.map_err(|_| SieveError::TaskDropped {
                url: url.to_string(),
            }),
        }
    }

    /// Submits every URL at once and returns the results in input order
    pub async fn submit_batch(&self, urls: &[String], options: ScrapeOptions) -> Vec<ScrapeResult> {
        let pending = urls
            .iter()
            .map(|url| self.submit_or_fail(url, options.clone()));
        futures::future::join_all(pending).await
    }

    /// Submits every URL and yields results as they complete
    pub fn submit_stream<'a>(
        &'a self,
        urls: &'a [String],
        options: ScrapeOptions,
    ) -> impl Stream<Item = ScrapeResult> + Unpin + 'a {
        urls.iter()
            .map(|url| self.submit_or_fail(url, options.clone()))
            .collect::<FuturesUnordered<_>>()
    }

    /// Fetches a page and classifies it without extracting or caching
    pub async fn classify_only(&self, url: &str) -> Result<ClassificationResult, ScrapeError> {
        let (url, domain) = parse_target(url).map_err(|e| ScrapeError {
            kind: ErrorKind::InvalidUrl,
            message: e.to_string(),
        })?;

        let inner = &self.inner;
        let outcome = inner
            .retry
            .execute(&domain, |_| inner.attempt(&url, &domain, &[]))
            .await;
        let response = outcome.result.map_err(|e| ScrapeError {
            kind: e.kind,
            message: e.message,
        })?;

        let classifier = Arc::clone(&inner.classifier);
        tokio::task::spawn_blocking(move || classifier.classify(url.as_str(), &response.body))
            .await
            .map_err(|e| ScrapeError {
                kind: ErrorKind::Unknown,
                message: format!("Classification task failed: {}", e),
            })
    }

    /// Counters plus queue, permit, cache and per-domain state
    pub fn stats(&self) -> EngineStats {
        let inner = &self.inner;
        let mut stats = inner.monitor.snapshot();
        stats.queue_depth = inner.queue.len();
        stats.in_flight = inner.scheduler.in_flight();
        stats.cache_entries = inner.cache.len();
        stats.domains = inner.store.snapshots();
        stats
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn has_renderer(&self) -> bool {
        self.inner.renderer.is_some()
    }

    pub fn store(&self) -> &Arc<DomainStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.inner.cache
    }

    /// Replies to every task still in the queue with a cancelled result
    fn fail_queued(&self) {
        let drained = self.inner.queue.drain();
        if !drained.is_empty() {
            tracing::info!("Failing {} queued tasks", drained.len());
        }
        for task in drained {
            let result = unprocessed(&task.url, ErrorKind::Cancelled, "Engine stopped before the task ran");
            self.inner.monitor.record_result(&result);
            let _ = task.reply.send(result);
        }
    }

    fn enqueue(&self, url: &str, options: ScrapeOptions) -> Result<Enqueued, SieveError> {
        // Held until the task is queued so stop() cannot drain in between
        let lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Running {
            return Err(SieveError::NotRunning);
        }

        let inner = &self.inner;
        if let Err(e) = parse_target(url) {
            inner.monitor.record_submitted();
            let result = unprocessed(url, ErrorKind::InvalidUrl, e.to_string());
            inner.monitor.record_result(&result);
            return Ok(Enqueued::Ready(result));
        }

        let (reply, receiver) = oneshot::channel();
        let task = CrawlTask {
            id: inner.next_id.fetch_add(1, Ordering::Relaxed),
            url: url.trim().to_string(),
            priority: options.priority,
            created_at: Utc::now(),
            options,
            reply,
        };

        inner.queue.push(task).map_err(|_| SieveError::QueueFull {
            capacity: inner.queue.capacity(),
        })?;
        inner.monitor.record_submitted();
        drop(lifecycle);
        Ok(Enqueued::Queued(receiver))
    }

    async fn submit_or_fail(&self, url: &str, options: ScrapeOptions) -> ScrapeResult {
        match self.submit(url, options).await {
            Ok(result) => result,
            Err(e) => unprocessed(url, e.kind(), e.to_string()),
        }
    }
}

impl EngineInner {
    /// Runs one task under its deadline and the engine's cancellation
    async fn process(&self, task: &CrawlTask) -> ScrapeResult {
        let started = Instant::now();
        let (url, domain) = match parse_target(&task.url) {
            Ok(target) => target,
            Err(e) => return unprocessed(&task.url, ErrorKind::InvalidUrl, e.to_string()),
        };
        let timeout = task
            .options
            .timeout
            .unwrap_or_else(|| self.config.engine.task_timeout());

        tracing::debug!("Task {} claimed: {}", task.id, url);

        let mut result = tokio::select! {
            outcome = tokio::time::timeout(timeout, self.scrape(&url, &domain, &task.options)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!("Task {} for {} timed out after {:?}", task.id, url, timeout);
                        ScrapeResult::new(url.as_str(), &domain).failed(
                            ErrorKind::Timeout,
                            format!("Task timed out after {} ms", timeout.as_millis()),
                        )
                    }
                }
            }
            _ = self.cancel.cancelled() => {
                ScrapeResult::new(url.as_str(), &domain).failed(ErrorKind::Cancelled, "Engine stopped")
            }
        };

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result.metadata = task.options.metadata.clone();
        result
    }

    async fn scrape(&self, url: &Url, domain: &str, options: &ScrapeOptions) -> ScrapeResult {
        // Cache entries hold the default analysis of a URL only
        let use_cache = options.use_cache
            && self.config.cache.enabled
            && options.page_type.is_none()
            && !options.render;

        if use_cache {
            if let Some(mut cached) = self.cache.get(url.as_str()).await {
                tracing::debug!("Cache hit for {}", url);
                cached.from_cache = true;
                cached.attempts = 0;
                return cached;
            }
        }

        let mut result = ScrapeResult::new(url.as_str(), domain);

        let headers = options.headers.as_slice();
        let fetch_started = Instant::now();
        let outcome = self
            .retry
            .execute(domain, |_| self.attempt(url, domain, headers))
            .await;
        if outcome.attempts > 0 {
            self.monitor.record_fetch(outcome.attempts, fetch_started.elapsed());
        }
        result.attempts = outcome.attempts;

        let response = match outcome.result {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!("Fetch of {} failed: {}", url, error);
                result.status_code = error.status;
                return result.failed(error.kind, error.message);
            }
        };
        result.status_code = Some(response.status);
        result.final_url = Some(response.final_url.clone());

        let mut body = response.body;
        if options.render {
            match self.render(url, &body).await {
                Ok(rendered) => {
                    body = rendered;
                    result.rendered = true;
                }
                Err(message) => result.render_error = Some(message),
            }
        }

        let fallback_body = match (&self.renderer, result.rendered) {
            (Some(_), false) => Some(body.clone()),
            _ => None,
        };

        let mut analysis = match self.analyze(url, body, options.page_type.clone()).await {
            Ok(analysis) => analysis,
            Err(e) => return result.failed(ErrorKind::Parsing, e),
        };

        // Low confidence on raw HTML escalates to the renderer
        if let Some(raw) = fallback_body {
            if analysis.extraction.confidence < self.config.extraction.render_threshold {
                tracing::debug!(
                    "Extraction confidence {:.2} for {}, trying the renderer",
                    analysis.extraction.confidence,
                    url
                );
                if let Ok(rendered) = self.render(url, &raw).await {
                    match self.analyze(url, rendered, options.page_type.clone()).await {
                        Ok(better) if better.extraction.confidence >= analysis.extraction.confidence => {
                            analysis = better;
                            result.rendered = true;
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Analysis of rendered {} failed: {}", url, e),
                    }
                }
            }
        }

        match self.selector.enrich(&analysis.extraction).await {
            EnrichmentStatus::Enriched(enrichment) => result.enrichment = Some(enrichment),
            EnrichmentStatus::Failed(message) => result.enrichment_error = Some(message),
            EnrichmentStatus::Skipped => {}
        }

        let extraction = analysis.extraction;
        result.page_type = analysis.page_type;
        result.classification_confidence = analysis.classification_confidence;
        result.extraction_confidence = extraction.confidence;
        result.extractor = Some(extraction.extractor);
        result.strategies_run = extraction.strategies_run;
        result.text_method = extraction.text_method;

        if !extraction.success {
            return result.failed(ErrorKind::Parsing, "No content could be extracted");
        }
        result.extraction_success = true;
        result.content = extraction.fields;

        if use_cache {
            if let Err(e) = self.cache.put(url.as_str(), &result).await {
                tracing::warn!("Failed to cache result for {}: {}", url, e);
            }
        }

        result
    }

    /// One network attempt: plan, wait, take permits, fetch
    ///
    /// Permits are taken after the polite delay and dropped as soon as the
    /// transport returns.
    async fn attempt(&self, url: &Url, domain: &str, headers: &[(String, String)]) -> FetchOutcome {
        let plan = self.anti_detection.prepare_request(url, domain, headers);
        if !plan.delay.is_zero() {
            tokio::time::sleep(plan.delay).await;
        }

        let _permit = match self.scheduler.acquire(domain).await {
            Ok(permit) => permit,
            Err(_) => {
                return FetchOutcome::Failed(TransportFailure {
                    kind: FailureKind::Other,
                    message: "Engine is shutting down".to_string(),
                })
            }
        };

        let request = FetchRequest::new(url.clone())
            .with_headers(plan.headers)
            .with_proxy(plan.proxy.clone());

        let started = Instant::now();
        let outcome = self.transport.fetch(&request).await;
        tracing::trace!("{} answered {:?} in {:?}", url, outcome.status(), started.elapsed());

        let proxy_ok = match &outcome {
            FetchOutcome::Response(response) => response.status < 500,
            FetchOutcome::Failed(_) => false,
        };
        self.anti_detection
            .record_proxy_result(plan.proxy.as_deref(), proxy_ok, started.elapsed());

        outcome
    }

    /// Renders through the configured renderer, or says why it could not
    async fn render(&self, url: &Url, html: &str) -> Result<String, String> {
        let Some(renderer) = self.renderer.as_ref() else {
            tracing::warn!("Render requested for {} but no renderer is configured", url);
            return Err("No renderer configured".to_string());
        };
        renderer.render(url, html).await.map_err(|e| {
            tracing::warn!("Renderer {} failed for {}: {}", renderer.name(), url, e);
            format!("Renderer {} failed: {}", renderer.name(), e)
        })
    }

    /// Parses, classifies and extracts on the blocking pool
    async fn analyze(&self, url: &Url, html: String, forced: Option<PageType>) -> Result<Analysis, String> {
        let classifier = Arc::clone(&self.classifier);
        let selector = Arc::clone(&self.selector);
        let url = url.clone();

        tokio::task::spawn_blocking(move || {
            let document = Html::parse_document(&html);
            let classification = classifier.classify_document(url.as_str(), &document);

            let (page_type, classification_confidence, is_forced) = match forced {
                Some(page_type) => {
                    let score = classification
                        .scores
                        .get(page_type.as_str())
                        .copied()
                        .unwrap_or(0.0);
                    (page_type, score, true)
                }
                None => (classification.page_type, classification.confidence, false),
            };

            let extraction = selector.select(&document, &url, &page_type, is_forced);
            Analysis {
                page_type,
                classification_confidence,
                extraction,
            }
        })
        .await
        .map_err(|e| format!("Extraction task failed: {}", e))
    }
}

async fn run_worker(inner: Arc<EngineInner>, worker_id: usize) {
    tracing::debug!("Worker {} started", worker_id);

    while let Some(task) = inner.queue.pop(&inner.cancel).await {
        let result = inner.process(&task).await;
        let completed = inner.monitor.record_result(&result);

        if task.reply.send(result).is_err() {
            tracing::debug!("Submitter of task {} went away", task.id);
        }

        let every = inner.config.engine.housekeeping_every_tasks;
        if every > 0 && completed % every == 0 {
            inner.housekeeper.run_once().await;
        }
    }

    tracing::debug!("Worker {} stopped", worker_id);
}

/// A failed result for a URL that never reached a worker
fn unprocessed(url: &str, kind: ErrorKind, message: impl Into<String>) -> ScrapeResult {
    let domain = parse_target(url).map(|(_, domain)| domain).unwrap_or_default();
    ScrapeResult::new(url, &domain).failed(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::render::RenderError;
    use crate::crawler::FetchResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use crate::config::KindPolicyConfig;
    use crate::state::BreakerState;
    use std::sync::atomic::{AtomicU16, AtomicU32};

    const STORY: &str = r#"<html><head><title>River floods town</title>
        <meta property="article:published_time" content="2024-05-01T10:00:00Z"></head>
        <body><article><h1>River floods town</h1><span class="byline">By A. Reporter</span>
        <time datetime="2024-05-01">May 1</time>
        <p>The river rose overnight and flooded the lower town while residents slept.</p>
        <p>Emergency crews arrived before dawn and began moving families to higher ground.</p>
        </article></body></html>"#;

    struct FakeTransport {
        calls: AtomicU32,
        status: AtomicU16,
        body: String,
        delay: Duration,
    }

    impl FakeTransport {
        fn new(status: u16, body: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                status: AtomicU16::new(status),
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_status(&self, status: u16) {
            self.status.store(status, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            FetchOutcome::Response(FetchResponse {
                status: self.status.load(Ordering::SeqCst),
                final_url: request.url.to_string(),
                headers: HashMap::new(),
                body: self.body.clone(),
                truncated: false,
            })
        }
    }

    struct StaticRenderer(String);

    #[async_trait]
    impl Renderer for StaticRenderer {
        fn name(&self) -> &str {
            "static"
        }

        async fn render(&self, _url: &Url, _html: &str) -> Result<String, RenderError> {
            Ok(self.0.clone())
        }
    }

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.engine.worker_count = 2;
        config.engine.housekeeping_interval_ms = 0;
        config.rate_limit.min_delay_ms = 0;
        config.rate_limit.target_rate = 1000.0;
        config.rate_limit.jitter = false;
        config.retry.jitter = 0.0;
        config
    }

    fn engine_with(transport: Arc<FakeTransport>, config: Config) -> Engine {
        Engine::builder(config)
            .transport(transport)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), create_test_config());

        assert!(matches!(
            engine.submit("https://paper.example/", ScrapeOptions::default()).await,
            Err(SieveError::NotRunning)
        ));

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(SieveError::AlreadyRunning)));

        engine.stop().await;
        assert!(!engine.is_running());
        assert!(matches!(engine.start(), Err(SieveError::Stopped)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = create_test_config();
        config.engine.max_concurrency = 0;
        let built = Engine::builder(config)
            .transport(Arc::new(FakeTransport::new(200, STORY)))
            .build();
        assert!(matches!(built, Err(SieveError::Config(_))));
    }

    #[tokio::test]
    async fn test_scrape_then_cache_hit() {
        let transport = Arc::new(FakeTransport::new(200, STORY));
        let engine = engine_with(Arc::clone(&transport), create_test_config());
        engine.start().unwrap();

        let url = "https://paper.example/news/2024/05/01/flood";
        let first = engine.submit(url, ScrapeOptions::default()).await.unwrap();
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.page_type, PageType::News);
        assert_eq!(first.extractor.as_deref(), Some("news"));
        assert_eq!(first.content["headline"], "River floods town");
        assert!(first.content["content"].as_str().unwrap().contains("river rose"));
        assert_eq!(first.status_code, Some(200));
        assert_eq!(first.attempts, 1);
        assert!(!first.from_cache);

        let second = engine.submit(url, ScrapeOptions::default()).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.content, first.content);
        assert_eq!(transport.calls(), 1);

        let stats = engine.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.domains.len(), 1);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_failed_result() {
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), create_test_config());
        engine.start().unwrap();

        let result = engine.submit("ftp://example.com/file", ScrapeOptions::default()).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidUrl));
        assert!(result.content.is_empty());

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_client_error_surfaces_without_content() {
        let transport = Arc::new(FakeTransport::new(404, "not found"));
        let engine = engine_with(Arc::clone(&transport), create_test_config());
        engine.start().unwrap();

        let result = engine.submit("https://example.com/missing", ScrapeOptions::default()).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::ClientError));
        assert_eq!(result.status_code, Some(404));
        assert!(result.content.is_empty());
        assert_eq!(transport.calls(), 1);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_forced_page_type() {
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), create_test_config());
        engine.start().unwrap();

        let options = ScrapeOptions::default()
            .with_page_type(PageType::Product)
            .without_cache();
        let result = engine.submit("https://paper.example/news/flood", options).await.unwrap();
        assert_eq!(result.page_type, PageType::Product);
        assert_eq!(result.extractor.as_deref(), Some("product"));

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_forced_page_type_skips_cached_default() {
        let transport = Arc::new(FakeTransport::new(200, STORY));
        let engine = engine_with(Arc::clone(&transport), create_test_config());
        engine.start().unwrap();

        let url = "https://paper.example/news/2024/05/01/flood";
        let default = engine.submit(url, ScrapeOptions::default()).await.unwrap();
        assert_eq!(default.page_type, PageType::News);

        let forced = engine
            .submit(url, ScrapeOptions::default().with_page_type(PageType::Product))
            .await
            .unwrap();
        assert_eq!(forced.page_type, PageType::Product);
        assert_eq!(forced.extractor.as_deref(), Some("product"));
        assert!(!forced.from_cache);
        assert_eq!(transport.calls(), 2);

        // The forced result did not replace the cached default
        let again = engine.submit(url, ScrapeOptions::default()).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(again.page_type, PageType::News);
        assert_eq!(transport.calls(), 2);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_render_request_skips_cache() {
        let transport = Arc::new(FakeTransport::new(200, STORY));
        let engine = Engine::builder(create_test_config())
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .renderer(Arc::new(StaticRenderer(STORY.to_string())))
            .build()
            .unwrap();
        engine.start().unwrap();

        let url = "https://paper.example/news/flood";
        let plain = engine.submit(url, ScrapeOptions::default()).await.unwrap();
        assert!(!plain.rendered);

        let options = ScrapeOptions {
            render: true,
            ..ScrapeOptions::default()
        };
        let rendered = engine.submit(url, options).await.unwrap();
        assert!(rendered.rendered);
        assert!(!rendered.from_cache);
        assert_eq!(transport.calls(), 2);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_render_without_renderer_is_recorded() {
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), create_test_config());
        assert!(!engine.has_renderer());
        engine.start().unwrap();

        let options = ScrapeOptions {
            render: true,
            ..ScrapeOptions::default()
        };
        let result = engine.submit("https://paper.example/news/flood", options).await.unwrap();
        assert!(result.is_success(), "{:?}", result.error);
        assert!(!result.rendered);
        assert_eq!(result.render_error.as_deref(), Some("No renderer configured"));

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_enrich_switch_attaches_builtin_oracle() {
        let mut config = create_test_config();
        config.extraction.enrich = true;
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), config);
        engine.start().unwrap();

        let result = engine
            .submit("https://paper.example/news/2024/05/01/flood", ScrapeOptions::default())
            .await
            .unwrap();
        assert!(result.is_success(), "{:?}", result.error);
        let enrichment = result.enrichment.expect("enrichment");
        assert!(!enrichment.keywords.is_empty());
        assert!(result.enrichment_error.is_none());

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_enrichment_off_by_default() {
        let engine = engine_with(Arc::new(FakeTransport::new(200, STORY)), create_test_config());
        engine.start().unwrap();

        let result = engine
            .submit("https://paper.example/news/2024/05/01/flood", ScrapeOptions::default())
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.enrichment.is_none());

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_low_confidence_escalates_to_renderer() {
        let shell = "<html><head><title>App</title></head><body><div id='root'></div></body></html>";
        let engine = Engine::builder(create_test_config())
            .transport(Arc::new(FakeTransport::new(200, shell)))
            .renderer(Arc::new(StaticRenderer(STORY.to_string())))
            .build()
            .unwrap();
        engine.start().unwrap();

        let result = engine.submit("https://paper.example/news/flood", ScrapeOptions::default()).await.unwrap();
        assert!(result.rendered);
        assert!(result.is_success());
        assert_eq!(result.page_type, PageType::News);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_task_timeout() {
        let mut transport = FakeTransport::new(200, STORY);
        transport.delay = Duration::from_secs(5);
        let engine = engine_with(Arc::new(transport), create_test_config());
        engine.start().unwrap();

        let options = ScrapeOptions {
            timeout: Some(Duration::from_millis(50)),
            ..ScrapeOptions::default()
        };
        let result = engine.submit("https://slow.example/", options).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        // The dropped attempt released its permits
        assert_eq!(engine.stats().in_flight, 0);

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_stop_fails_pending_work() {
        let mut transport = FakeTransport::new(200, STORY);
        transport.delay = Duration::from_secs(30);
        let mut config = create_test_config();
        config.engine.worker_count = 1;
        let engine = Arc::new(engine_with(Arc::new(transport), config));
        engine.start().unwrap();

        let urls: Vec<String> = (0..3).map(|i| format!("https://slow.example/{}", i)).collect();
        let batch = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit_batch(&urls, ScrapeOptions::default()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop().await;

        let results = batch.await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| r.error_kind() == Some(ErrorKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_submit_after_stop_leaves_nothing_queued() {
        let engine = Arc::new(engine_with(
            Arc::new(FakeTransport::new(200, STORY)),
            create_test_config(),
        ));
        engine.start().unwrap();

        // Submitters racing the shutdown either get a result or NotRunning
        let racers: Vec<_> = (0..20)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let url = format!("https://paper.example/news/{}", i);
                    engine.submit(&url, ScrapeOptions::default().without_cache()).await
                })
            })
            .collect();
        engine.stop().await;

        for racer in racers {
            let outcome = tokio::time::timeout(Duration::from_secs(5), racer)
                .await
                .expect("submit hung after stop")
                .unwrap();
            assert!(matches!(outcome, Ok(_) | Err(SieveError::NotRunning)));
        }

        assert!(matches!(
            engine.submit("https://paper.example/late", ScrapeOptions::default()).await,
            Err(SieveError::NotRunning)
        ));
        assert_eq!(engine.stats().queue_depth, 0);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let mut transport = FakeTransport::new(200, STORY);
        transport.delay = Duration::from_secs(30);
        let mut config = create_test_config();
        config.engine.worker_count = 1;
        config.engine.queue_capacity = 1;
        let engine = Arc::new(engine_with(Arc::new(transport), config));
        engine.start().unwrap();

        // The worker claims the first task, the second waits in the queue
        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit("https://slow.example/1", ScrapeOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.submit("https://slow.example/2", ScrapeOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let third = engine.submit("https://slow.example/3", ScrapeOptions::default()).await;
        assert!(matches!(third, Err(SieveError::QueueFull { capacity: 1 })));

        engine.stop().await;
        assert!(first.await.unwrap().unwrap().error.is_some());
        assert!(second.await.unwrap().unwrap().error.is_some());
    }

    #[tokio::test]
    async fn test_classify_only() {
        let transport = Arc::new(FakeTransport::new(200, STORY));
        let engine = engine_with(Arc::clone(&transport), create_test_config());

        let classification = engine
            .classify_only("https://paper.example/news/2024/05/01/flood")
            .await
            .unwrap();
        assert_eq!(classification.page_type, PageType::News);
        assert_eq!(transport.calls(), 1);

        let invalid = engine.classify_only("not a url").await.unwrap_err();
        assert_eq!(invalid.kind, ErrorKind::InvalidUrl);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_one_half_open_request() {
        let mut transport = FakeTransport::new(503, STORY);
        transport.delay = Duration::from_millis(100);
        let transport = Arc::new(transport);

        let mut config = create_test_config();
        config.rate_limit.max_delay_ms = 20;
        config.circuit_breaker.failure_threshold = 2;
        config.circuit_breaker.recovery_timeout_ms = 100;
        config.retry.policies.insert(
            "server_error".to_string(),
            KindPolicyConfig {
                max_retries: Some(0),
                base_delay_ms: None,
            },
        );
        let engine = engine_with(Arc::clone(&transport), config);
        engine.start().unwrap();

        let url = "https://flaky.example/status";
        let options = ScrapeOptions::default().without_cache();
        for _ in 0..2 {
            let result = engine.submit(url, options.clone()).await.unwrap();
            assert_eq!(result.error_kind(), Some(ErrorKind::ServerError));
        }
        let breaker = |engine: &Engine| engine.store().snapshot("flaky.example").unwrap().breaker;
        assert_eq!(breaker(&engine), BreakerState::Open);

        let rejected = engine.submit(url, options.clone()).await.unwrap();
        assert_eq!(rejected.error_kind(), Some(ErrorKind::CircuitOpen));
        assert_eq!(rejected.attempts, 0);
        assert_eq!(transport.calls(), 2);

        transport.set_status(200);
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Only one of two concurrent submits is let through while half-open
        let urls = vec![url.to_string(), url.to_string()];
        let results = engine.submit_batch(&urls, options).await;
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let rejected = results
            .iter()
            .filter(|r| r.error_kind() == Some(ErrorKind::CircuitOpen))
            .count();
        assert_eq!((succeeded, rejected), (1, 1));
        assert_eq!(transport.calls(), 3);
        assert_eq!(breaker(&engine), BreakerState::Closed);

        engine.stop().await;
    }
}
