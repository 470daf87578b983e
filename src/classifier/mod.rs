//! Page classifier
//!
//! Scores an HTML page against every registered [`PageSignature`] and reports
//! the best match. Four signals contribute: URL patterns, keywords found in the
//! page's title and descriptive meta tags, CSS selectors present in the body,
//! and specific meta tags.
//!
//! New page types are added with [`PageClassifier::register`]; nothing in the
//! scoring code knows about individual types.

mod page_type;
mod signature;

pub use page_type::PageType;
pub use signature::{builtin_signatures, MetaIndicator, PageSignature};

use crate::config::ClassifierConfig;
use crate::extract::dom;
use crate::ConfigError;
use scraper::Html;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of classifying one page
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub page_type: PageType,

    /// Score of the winning type, in [0, 1]
    pub confidence: f64,

    /// Score of every registered type
    pub scores: BTreeMap<String, f64>,
}

/// Signature registry plus scoring weights
#[derive(Debug, Clone)]
pub struct PageClassifier {
    signatures: Vec<PageSignature>,
    config: ClassifierConfig,
}

impl PageClassifier {
    /// Creates a classifier with no registered types
    pub fn empty(config: ClassifierConfig) -> Self {
        Self {
            signatures: Vec::new(),
            config,
        }
    }

    /// Creates a classifier with the built-in page types registered
    pub fn new(config: ClassifierConfig) -> Result<Self, ConfigError> {
        let mut classifier = Self::empty(config);
        for signature in builtin_signatures()? {
            classifier.register(signature);
        }
        Ok(classifier)
    }

    /// Registers a signature; a signature for an existing type replaces it in place
    pub fn register(&mut self, signature: PageSignature) {
        match self
            .signatures
            .iter_mut()
            .find(|existing| existing.page_type == signature.page_type)
        {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    pub fn page_types(&self) -> Vec<PageType> {
        self.signatures.iter().map(|s| s.page_type.clone()).collect()
    }

    /// Classifies raw HTML fetched from `url`
    pub fn classify(&self, url: &str, html: &str) -> ClassificationResult {
        let document = Html::parse_document(html);
        self.classify_document(url, &document)
    }

    /// Classifies an already parsed document
    ///
    /// Ties go to the type registered first. If the best score is below the
    /// configured threshold the page is reported as unknown with that score.
    pub fn classify_document(&self, url: &str, document: &Html) -> ClassificationResult {
        let meta_text = descriptive_text(document);
        let mut scores = BTreeMap::new();
        let mut best: Option<(&PageType, f64)> = None;

        for signature in &self.signatures {
            let score = self.score(signature, url, document, &meta_text);
            scores.insert(signature.page_type.to_string(), score);

            if best.map(|(_, top)| score > top).unwrap_or(true) {
                best = Some((&signature.page_type, score));
            }
        }

        let (page_type, confidence) = match best {
            Some((page_type, score)) if score >= self.config.threshold => {
                (page_type.clone(), score)
            }
            Some((_, score)) => (PageType::Unknown, score),
            None => (PageType::Unknown, 0.0),
        };

        ClassificationResult {
            page_type,
            confidence,
            scores,
        }
    }

    /// Weighted combination of the four sub-scores, normalized to [0, 1]
    fn score(&self, signature: &PageSignature, url: &str, document: &Html, meta_text: &str) -> f64 {
        let url_score = fraction(&signature.url_patterns, |re| re.is_match(url));
        let keyword_score = fraction(&signature.keywords, |k| meta_text.contains(k.as_str()));
        let selector_score = fraction(&signature.selectors, |sel| {
            document.select(sel).next().is_some()
        });
        let meta_score = fraction(&signature.meta_tags, |tag| meta_matches(document, tag));

        let c = &self.config;
        let total_weight = c.url_weight + c.keyword_weight + c.selector_weight + c.meta_weight;
        if total_weight <= 0.0 {
            return 0.0;
        }

        let weighted = url_score * c.url_weight
            + keyword_score * c.keyword_weight
            + selector_score * c.selector_weight
            + meta_score * c.meta_weight;

        (weighted / total_weight).clamp(0.0, 1.0)
    }
}

/// Fraction of `items` satisfying `matches`; zero for an empty list
fn fraction<T>(items: &[T], matches: impl Fn(&T) -> bool) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().filter(|item| matches(item)).count() as f64 / items.len() as f64
}

/// Lowercased title, keywords and descriptions used for keyword matching
fn descriptive_text(document: &Html) -> String {
    let parts = [
        dom::meta_content(document, "keywords"),
        dom::meta_content(document, "description"),
        dom::meta_content(document, "og:description"),
        dom::title(document),
    ];
    parts
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn meta_matches(document: &Html, indicator: &MetaIndicator) -> bool {
    match dom::meta_content(document, &indicator.name) {
        Some(content) => match &indicator.value {
            Some(expected) => content.to_lowercase().contains(expected.as_str()),
            None => true,
        },
        None => false,
    }
}
