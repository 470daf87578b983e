use crate::classifier::PageType;
use crate::config::ExtractionConfig;
use crate::extract::{
    default_methods, Enrichment, EnrichmentOracle, ExtractorRegistry, Fields, TextMethod,
    TextScorer,
};
use scraper::Html;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// The chosen extraction for one page, with provenance
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Extractor whose fields were kept
    pub extractor: String,

    /// Every extractor that ran, in order
    pub strategies_run: Vec<String>,

    pub fields: Fields,
    pub confidence: f64,

    /// Main-text method that won, if any produced text
    pub text_method: Option<String>,
    pub text_score: Option<f64>,

    /// Whether anything was extracted at all
    pub success: bool,
}

impl Extraction {
    /// The selected main text
    pub fn main_text(&self) -> Option<&str> {
        self.fields.get("content").and_then(Value::as_str)
    }

    /// Best available title for the page
    pub fn title(&self) -> Option<&str> {
        ["title", "headline", "name", "thread_title"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
    }
}

/// What happened when the enrichment oracle ran
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentStatus {
    /// No oracle configured, or no text to enrich
    Skipped,
    Enriched(Enrichment),
    /// The oracle failed or timed out; the extraction stands without enrichment
    Failed(String),
}

/// Chooses an extractor and the best main text for a page
pub struct ExtractionSelector {
    registry: ExtractorRegistry,
    methods: Vec<Box<dyn TextMethod>>,
    scorer: TextScorer,
    fallback_threshold: f64,
    oracle: Option<Arc<dyn EnrichmentOracle>>,
    oracle_timeout: Duration,
}

impl ExtractionSelector {
    pub fn new(registry: ExtractorRegistry, config: &ExtractionConfig) -> Self {
        Self {
            registry,
            methods: default_methods(),
            scorer: TextScorer::from_config(config),
            fallback_threshold: config.fallback_threshold,
            oracle: None,
            oracle_timeout: config.oracle_timeout(),
        }
    }

    /// Selector with the built-in extractors and text methods
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(ExtractorRegistry::with_defaults(), config)
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn EnrichmentOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Replaces the main-text methods; candidates are compared in this order
    pub fn with_methods(mut self, methods: Vec<Box<dyn TextMethod>>) -> Self {
        self.methods = methods;
        self
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// Extracts a parsed page
    ///
    /// # Arguments
    ///
    /// * `page_type` - The forced or classified page type
    /// * `forced` - Whether `page_type` was forced by the caller; a forced
    ///   extractor is kept regardless of its confidence
    pub fn select(&self, document: &Html, url: &Url, page_type: &PageType, forced: bool) -> Extraction {
        let mut strategies_run = Vec::new();
        let mut chosen = None;

        if let Some(specialist) = self.registry.for_page_type(page_type) {
            let confidence = specialist.confidence_score(document);
            strategies_run.push(specialist.name().to_string());

            if forced || confidence >= self.fallback_threshold {
                chosen = Some((specialist.name().to_string(), specialist.extract(document, url), confidence));
            } else {
                debug!(
                    "Extractor {} confidence {:.2} below {:.2} for {}, falling back",
                    specialist.name(),
                    confidence,
                    self.fallback_threshold,
                    url
                );
            }
        }

        let (extractor, mut fields, confidence) = match chosen {
            Some(chosen) => chosen,
            None => match self.registry.general() {
                Some(general) => {
                    strategies_run.push(general.name().to_string());
                    (
                        general.name().to_string(),
                        general.extract(document, url),
                        general.confidence_score(document),
                    )
                }
                None => ("none".to_string(), Fields::new(), 0.0),
            },
        };

        let candidate = self.scorer.best_candidate(&self.methods, document);
        let (text_method, text_score) = match candidate {
            Some(candidate) => {
                fields.insert("content".to_string(), Value::String(candidate.text()));
                fields.insert("word_count".to_string(), Value::from(candidate.word_count()));
                (Some(candidate.method), Some(candidate.score))
            }
            None => (None, None),
        };

        Extraction {
            extractor,
            strategies_run,
            success: !fields.is_empty(),
            fields,
            confidence,
            text_method,
            text_score,
        }
    }

    /// Runs the oracle on the selected text, bounded by the oracle timeout
    pub async fn enrich(&self, extraction: &Extraction) -> EnrichmentStatus {
        let (Some(oracle), Some(text)) = (&self.oracle, extraction.main_text()) else {
            return EnrichmentStatus::Skipped;
        };

        match tokio::time::timeout(self.oracle_timeout, oracle.enrich(text, extraction.title())).await {
            Ok(Ok(enrichment)) => EnrichmentStatus::Enriched(enrichment),
            Ok(Err(e)) => {
                warn!("Enrichment by {} failed: {}", oracle.name(), e);
                EnrichmentStatus::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "Enrichment by {} timed out after {:?}",
                    oracle.name(),
                    self.oracle_timeout
                );
                EnrichmentStatus::Failed(format!(
                    "oracle timed out after {} ms",
                    self.oracle_timeout.as_millis()
                ))
            }
        }
    }
}

impl std::fmt::Debug for ExtractionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionSelector")
            .field("registry", &self.registry)
            .field("fallback_threshold", &self.fallback_threshold)
            .field("oracle", &self.oracle.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FrequencyOracle, OracleError};
    use async_trait::async_trait;

    fn create_test_selector() -> ExtractionSelector {
        ExtractionSelector::from_config(&ExtractionConfig::default())
    }

    fn url() -> Url {
        Url::parse("https://paper.example/news/flood").unwrap()
    }

    fn story() -> String {
        let paragraph = "The river rose overnight and flooded the lower town while residents slept.";
        format!(
            r#"<html><head><title>River floods town</title>
            <meta property="article:published_time" content="2024-05-01T10:00:00Z"></head>
            <body><article><h1>River floods town</h1><span class="byline">By A. Reporter</span>
            <time datetime="2024-05-01">May 1</time><p>{p}</p><p>{p}</p><p>{p}</p></article></body></html>"#,
            p = paragraph
        )
    }

    #[test]
    fn test_specialist_used_when_confident() {
        let doc = Html::parse_document(&story());
        let extraction = create_test_selector().select(&doc, &url(), &PageType::News, false);

        assert_eq!(extraction.extractor, "news");
        assert_eq!(extraction.strategies_run, vec!["news"]);
        assert!(extraction.confidence >= 0.5);
        assert_eq!(extraction.text_method.as_deref(), Some("semantic_container"));
        assert!(extraction.main_text().unwrap().starts_with("The river rose"));
        assert_eq!(extraction.title(), Some("River floods town"));
        assert!(extraction.success);
    }

    #[test]
    fn test_low_confidence_falls_back_to_general() {
        let doc = Html::parse_document("<html><head><title>Shop</title></head><body><p>Nothing for sale here today.</p></body></html>");
        let extraction = create_test_selector().select(&doc, &url(), &PageType::Product, false);

        assert_eq!(extraction.extractor, "general");
        assert_eq!(extraction.strategies_run, vec!["product", "general"]);
        assert_eq!(extraction.fields["title"], "Shop");
    }

    #[test]
    fn test_forced_type_keeps_specialist() {
        let doc = Html::parse_document("<html><body><p>Nothing for sale here today.</p></body></html>");
        let extraction = create_test_selector().select(&doc, &url(), &PageType::Product, true);

        assert_eq!(extraction.extractor, "product");
        assert_eq!(extraction.confidence, 0.0);
        assert!(extraction.fields.contains_key("content"));
    }

    #[test]
    fn test_unknown_type_uses_general() {
        let doc = Html::parse_document("<html><body></body></html>");
        let extraction = create_test_selector().select(&doc, &url(), &PageType::Unknown, false);

        assert_eq!(extraction.extractor, "general");
        assert_eq!(extraction.strategies_run, vec!["general"]);
        assert!(extraction.text_method.is_none());
        assert!(!extraction.success);
    }

    struct FailingOracle;

    #[async_trait]
    impl EnrichmentOracle for FailingOracle {
        fn name(&self) -> &str {
            "failing"
        }

        async fn enrich(&self, _text: &str, _title: Option<&str>) -> Result<Enrichment, OracleError> {
            Err(OracleError::Unavailable("model offline".to_string()))
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl EnrichmentOracle for SlowOracle {
        fn name(&self) -> &str {
            "slow"
        }

        async fn enrich(&self, _text: &str, _title: Option<&str>) -> Result<Enrichment, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Enrichment::default())
        }
    }

    #[tokio::test]
    async fn test_enrichment_outcomes() {
        let doc = Html::parse_document(&story());

        let plain = create_test_selector();
        let extraction = plain.select(&doc, &url(), &PageType::News, false);
        assert_eq!(plain.enrich(&extraction).await, EnrichmentStatus::Skipped);

        let enriched = create_test_selector().with_oracle(Arc::new(FrequencyOracle::default()));
        assert!(matches!(
            enriched.enrich(&extraction).await,
            EnrichmentStatus::Enriched(e) if e.keywords.contains(&"river".to_string())
        ));

        let failing = create_test_selector().with_oracle(Arc::new(FailingOracle));
        assert!(matches!(
            failing.enrich(&extraction).await,
            EnrichmentStatus::Failed(message) if message.contains("model offline")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_timeout() {
        let doc = Html::parse_document(&story());
        let selector = create_test_selector().with_oracle(Arc::new(SlowOracle));
        let extraction = selector.select(&doc, &url(), &PageType::News, false);

        assert!(matches!(
            selector.enrich(&extraction).await,
            EnrichmentStatus::Failed(message) if message.contains("timed out")
        ));
    }
}
