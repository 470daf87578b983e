use crate::common::{create_test_config, mount_news_page, request_count, start_engine, TEST_CONFIG};
use futures::StreamExt;
use std::io::Write;
use sumi_sieve::config::load_config;
use sumi_sieve::{ErrorKind, PageType, ScrapeOptions};
use wiremock::MockServer;

#[tokio::test]
async fn test_scrape_news_page() {
    let server = MockServer::start().await;
    mount_news_page(&server, "/news/2024/05/01/flood").await;

    let engine = start_engine(create_test_config());
    let url = format!("{}/news/2024/05/01/flood", server.uri());

    let mut options = ScrapeOptions::default();
    options
        .metadata
        .insert("job".to_string(), "nightly".to_string());

    let result = engine.submit(&url, options).await.expect("Submit should succeed");

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.page_type, PageType::News);
    assert!(result.classification_confidence > 0.3);
    assert_eq!(result.extractor.as_deref(), Some("news"));
    assert_eq!(result.content["headline"], "River floods town");
    assert_eq!(result.content["author"], "A. Reporter");
    assert!(result.content["content"]
        .as_str()
        .unwrap()
        .contains("Emergency crews"));
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.metadata["job"], "nightly");
    assert!(!result.from_cache);

    engine.stop().await;
}

#[tokio::test]
async fn test_cache_survives_engine_restart() {
    let server = MockServer::start().await;
    mount_news_page(&server, "/news/flood").await;
    let url = format!("{}/news/flood", server.uri());

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = create_test_config();
    config.cache.directory = Some(dir.path().to_string_lossy().to_string());

    let first = start_engine(config.clone());
    let fetched = first.submit(&url, ScrapeOptions::default()).await.unwrap();
    assert!(fetched.is_success());
    assert!(!fetched.from_cache);
    first.stop().await;

    // A fresh engine finds the entry on disk
    let second = start_engine(config);
    let cached = second.submit(&url, ScrapeOptions::default()).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.content, fetched.content);
    assert_eq!(request_count(&server).await, 1);

    // Bypassing the cache goes back to the network
    let fresh = second
        .submit(&url, ScrapeOptions::default().without_cache())
        .await
        .unwrap();
    assert!(!fresh.from_cache);
    assert_eq!(request_count(&server).await, 2);

    second.stop().await;
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let server = MockServer::start().await;
    mount_news_page(&server, "/news/a").await;
    mount_news_page(&server, "/news/b").await;

    let engine = start_engine(create_test_config());
    let urls = vec![
        format!("{}/news/a", server.uri()),
        "mailto:editor@example.com".to_string(),
        format!("{}/news/b", server.uri()),
    ];

    let results = engine.submit_batch(&urls, ScrapeOptions::default()).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert_eq!(results[1].error_kind(), Some(ErrorKind::InvalidUrl));
    assert!(results[2].is_success());
    assert!(results[0].url.ends_with("/news/a"));
    assert!(results[2].url.ends_with("/news/b"));

    engine.stop().await;
}

#[tokio::test]
async fn test_stream_yields_every_result() {
    let server = MockServer::start().await;
    for route in ["/news/1", "/news/2", "/news/3"] {
        mount_news_page(&server, route).await;
    }

    let engine = start_engine(create_test_config());
    let urls: Vec<String> = (1..=3)
        .map(|i| format!("{}/news/{}", server.uri(), i))
        .collect();

    let mut seen: Vec<String> = engine
        .submit_stream(&urls, ScrapeOptions::default())
        .map(|result| result.url)
        .collect()
        .await;
    seen.sort();

    let mut expected = urls.clone();
    expected.sort();
    assert_eq!(seen, expected);

    let stats = engine.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.page_types["news"], 3);

    engine.stop().await;
}

#[tokio::test]
async fn test_classify_only_skips_cache() {
    let server = MockServer::start().await;
    mount_news_page(&server, "/news/flood").await;

    let engine = start_engine(create_test_config());
    let url = format!("{}/news/flood", server.uri());

    let classification = engine.classify_only(&url).await.expect("Should classify");
    assert_eq!(classification.page_type, PageType::News);
    assert!(classification.scores.contains_key("product"));
    assert!(engine.cache().is_empty());

    engine.stop().await;
}

#[tokio::test]
async fn test_config_loaded_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(TEST_CONFIG.as_bytes()).unwrap();

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.engine.worker_count, 4);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert!(!config.rate_limit.jitter);

    let engine = start_engine(config);
    assert!(engine.is_running());
    engine.stop().await;
}
