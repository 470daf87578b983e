//! Shared fixtures

use sumi_sieve::config::{parse_config, Config};
use sumi_sieve::Engine;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fast pacing, short backoffs, a three-strike breaker
pub const TEST_CONFIG: &str = r#"
[engine]
worker-count = 4
housekeeping-interval-ms = 0

[rate-limit]
target-rate = 1000.0
min-delay-ms = 0
jitter = false

[retry]
jitter = 0.0
max-delay-ms = 200

[retry.policies.rate_limit]
max-retries = 3
base-delay-ms = 10

[retry.policies.server_error]
max-retries = 0

[circuit-breaker]
failure-threshold = 3
recovery-timeout-ms = 60000
"#;

pub const NEWS_PAGE: &str = r#"<html><head>
    <title>River floods town</title>
    <meta property="article:published_time" content="2024-05-01T10:00:00Z">
    </head><body><article>
    <h1>River floods town</h1>
    <span class="byline">By A. Reporter</span>
    <time datetime="2024-05-01">May 1</time>
    <p>The river rose overnight and flooded the lower town while residents slept.</p>
    <p>Emergency crews arrived before dawn and began moving families to higher ground.</p>
    </article></body></html>"#;

/// Creates the configuration shared by the HTTP scenarios
pub fn create_test_config() -> Config {
    parse_config(TEST_CONFIG).expect("Test config should parse")
}

/// Builds and starts an engine using the reqwest transport
pub fn start_engine(config: Config) -> Engine {
    let engine = Engine::builder(config)
        .build()
        .expect("Engine should build");
    engine.start().expect("Engine should start");
    engine
}

/// Serves the news page at `route`
pub async fn mount_news_page(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(NEWS_PAGE)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Number of requests the server has seen
pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}
