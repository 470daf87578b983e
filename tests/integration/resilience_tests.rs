use crate::common::{create_test_config, request_count, start_engine, NEWS_PAGE};
use sumi_sieve::state::BreakerState;
use sumi_sieve::{ErrorKind, ScrapeOptions};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_rate_limit_retried_then_cached() {
    let server = MockServer::start().await;

    // Mocks are matched in mount order; the 429s run out after two requests
    Mock::given(method("GET"))
        .and(path("/news/busy"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string(NEWS_PAGE))
        .mount(&server)
        .await;

    let engine = start_engine(create_test_config());
    let url = format!("{}/news/busy", server.uri());

    let result = engine.submit(&url, ScrapeOptions::default()).await.unwrap();
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.attempts, 3);
    assert!(!result.from_cache);
    assert_eq!(engine.stats().retries, 2);
    assert_eq!(request_count(&server).await, 3);

    let again = engine.submit(&url, ScrapeOptions::default()).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(again.content, result.content);
    assert_eq!(request_count(&server).await, 3);

    engine.stop().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = start_engine(create_test_config());
    let result = engine
        .submit(&format!("{}/gone", server.uri()), ScrapeOptions::default())
        .await
        .unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::ClientError));
    assert_eq!(result.status_code, Some(404));
    assert!(result.content.is_empty());
    assert_eq!(request_count(&server).await, 1);

    // A 404 says nothing about the server's health
    let domain = &result.domain;
    let snapshot = engine.store().snapshot(domain).unwrap();
    assert_eq!(snapshot.breaker, BreakerState::Closed);

    engine.stop().await;
}

#[tokio::test]
async fn test_breaker_opens_and_rejects_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = start_engine(create_test_config());

    for i in 0..3 {
        let result = engine
            .submit(&format!("{}/page/{}", server.uri(), i), ScrapeOptions::default())
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::ServerError));
        assert_eq!(result.status_code, Some(503));
    }
    assert_eq!(request_count(&server).await, 3);

    let rejected = engine
        .submit(&format!("{}/page/next", server.uri()), ScrapeOptions::default())
        .await
        .unwrap();
    assert_eq!(rejected.error_kind(), Some(ErrorKind::CircuitOpen));
    assert_eq!(rejected.attempts, 0);
    assert_eq!(request_count(&server).await, 3);

    let snapshot = engine.store().snapshot(&rejected.domain).unwrap();
    assert_eq!(snapshot.breaker, BreakerState::Open);
    assert_eq!(engine.stats().breaker_rejections, 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_empty_body_is_a_parsing_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   "))
        .mount(&server)
        .await;

    let engine = start_engine(create_test_config());
    let result = engine
        .submit(&format!("{}/blank", server.uri()), ScrapeOptions::default())
        .await
        .unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::Parsing));
    assert_eq!(request_count(&server).await, 1);
    assert!(engine.cache().is_empty());

    engine.stop().await;
}
