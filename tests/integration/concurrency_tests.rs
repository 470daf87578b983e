use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_sieve::crawler::{FetchOutcome, FetchRequest, FetchResponse, Transport};
use sumi_sieve::{Engine, ScrapeOptions};

use crate::common::{create_test_config, NEWS_PAGE};

/// Transport that records how many calls overlap, globally and per host
#[derive(Default)]
struct GaugeTransport {
    current: AtomicUsize,
    peak: AtomicUsize,
    per_host: Mutex<HashMap<String, (usize, usize)>>,
    calls: AtomicUsize,
}

impl GaugeTransport {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn peak_for_any_host(&self) -> usize {
        self.per_host
            .lock()
            .values()
            .map(|(_, peak)| *peak)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for GaugeTransport {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let host = request.url.host_str().unwrap_or_default().to_string();
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        {
            let mut hosts = self.per_host.lock();
            let entry = hosts.entry(host.clone()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;

        self.per_host.lock().entry(host).or_insert((1, 1)).0 -= 1;
        self.current.fetch_sub(1, Ordering::SeqCst);

        FetchOutcome::Response(FetchResponse {
            status: 200,
            final_url: request.url.to_string(),
            headers: HashMap::new(),
            body: NEWS_PAGE.to_string(),
            truncated: false,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limits_hold() {
    let mut config = create_test_config();
    config.engine.max_concurrency = 10;
    config.engine.per_domain_concurrency = 3;
    config.engine.worker_count = 30;
    config.cache.enabled = false;

    let transport = Arc::new(GaugeTransport::default());
    let engine = Engine::builder(config)
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .build()
        .unwrap();
    engine.start().unwrap();

    let urls: Vec<String> = (0..100)
        .map(|i| format!("https://site{}.example/news/{}", i % 5, i))
        .collect();
    let results = engine.submit_batch(&urls, ScrapeOptions::default()).await;

    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 100);

    assert!(transport.peak() <= 10, "global peak {}", transport.peak());
    assert!(
        transport.peak_for_any_host() <= 3,
        "per-host peak {}",
        transport.peak_for_any_host()
    );
    // Several domains were fetched in parallel
    assert!(transport.peak() > 3);

    let stats = engine.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.domains.len(), 5);

    engine.stop().await;
}

#[tokio::test]
async fn test_higher_priority_runs_first() {
    let mut config = create_test_config();
    config.engine.worker_count = 1;
    config.cache.enabled = false;

    let transport = Arc::new(GaugeTransport::default());
    let engine = Arc::new(
        Engine::builder(config)
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .build()
            .unwrap(),
    );
    engine.start().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));

    // Occupy the only worker so the rest queue up
    let blocker = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .submit("https://a.example/news/first", ScrapeOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut waiting = Vec::new();
    for (name, priority) in [("low", 0), ("high", 10), ("mid", 5)] {
        let engine = Arc::clone(&engine);
        let order = Arc::clone(&order);
        waiting.push(tokio::spawn(async move {
            let url = format!("https://b.example/news/{}", name);
            let result = engine
                .submit(&url, ScrapeOptions::default().with_priority(priority))
                .await
                .unwrap();
            order.lock().push(name);
            result
        }));
        // Let each submission reach the queue in turn
        tokio::task::yield_now().await;
    }

    blocker.await.unwrap().unwrap();
    for handle in waiting {
        assert!(handle.await.unwrap().is_success());
    }

    assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
    engine.stop().await;
}
