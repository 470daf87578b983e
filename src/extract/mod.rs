//! Content extraction
//!
//! Extraction happens in two layers. A [`ContentExtractor`] pulls the fields
//! that make sense for one family of page types (a headline and byline for news,
//! a price for products, ...) and reports how much structural evidence it found.
//! Independently, every [`TextMethod`] proposes a main text; the
//! [`ExtractionSelector`] scores those candidates and keeps the best one.
//!
//! Extractors live in an [`ExtractorRegistry`] keyed by name, so new strategies
//! can be added without touching the selector.

pub mod dom;
mod oracle;
mod selector;
mod strategies;
mod text;

pub use oracle::{Enrichment, EnrichmentOracle, FrequencyOracle, OracleError};
pub use selector::{EnrichmentStatus, Extraction, ExtractionSelector};
pub use strategies::{
    BlogExtractor, ForumExtractor, GeneralExtractor, NewsExtractor, ProductExtractor,
};
pub use text::{
    default_methods, ParagraphSweep, SemanticContainer, TextCandidate, TextDensity, TextMethod,
    TextScorer,
};

use crate::classifier::PageType;
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Extracted fields, keyed by field name
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Name of the extractor used when nothing more specific applies
pub const GENERAL_EXTRACTOR: &str = "general";

/// One extraction strategy
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Page types this extractor is the specialist for
    fn page_types(&self) -> Vec<PageType>;

    /// Pulls every field the extractor knows about; missing fields are omitted
    fn extract(&self, document: &Html, url: &Url) -> Fields;

    /// Structural evidence for this extractor's fields, in [0, 1]
    ///
    /// Looks only at which elements are present, never at the quality of
    /// the text inside them.
    fn confidence_score(&self, document: &Html) -> f64;
}

/// Extractors keyed by name, in registration order
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn ContentExtractor>>,
    by_name: HashMap<String, usize>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in extractors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GeneralExtractor));
        registry.register(Arc::new(NewsExtractor));
        registry.register(Arc::new(BlogExtractor));
        registry.register(Arc::new(ProductExtractor));
        registry.register(Arc::new(ForumExtractor));
        registry
    }

    /// Registers an extractor, replacing any extractor with the same name
    pub fn register(&mut self, extractor: Arc<dyn ContentExtractor>) {
        let name = extractor.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => self.extractors[index] = extractor,
            None => {
                self.by_name.insert(name, self.extractors.len());
                self.extractors.push(extractor);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentExtractor>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.extractors[index]))
    }

    /// The general-purpose extractor, if registered
    pub fn general(&self) -> Option<Arc<dyn ContentExtractor>> {
        self.get(GENERAL_EXTRACTOR)
    }

    /// The first specialist registered for `page_type`
    pub fn for_page_type(&self, page_type: &PageType) -> Option<Arc<dyn ContentExtractor>> {
        self.extractors
            .iter()
            .filter(|extractor| extractor.name() != GENERAL_EXTRACTOR)
            .find(|extractor| extractor.page_types().contains(page_type))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
