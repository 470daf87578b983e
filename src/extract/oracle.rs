//! Content enrichment
//!
//! An [`EnrichmentOracle`] turns extracted main text into a quality score,
//! keywords, a summary and similar signals. Any model-backed service can sit
//! behind the trait; [`FrequencyOracle`] is a dependency-free heuristic that
//! ships with the crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors reported by an oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle rejected input: {0}")]
    InvalidInput(String),

    #[error("Oracle timed out after {0} ms")]
    Timeout(u64),
}

/// Signals derived from a page's main text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Overall content quality in [0, 1]
    pub quality_score: f64,

    /// ISO 639-1 code of the detected language
    pub language: Option<String>,

    pub keywords: Vec<String>,
    pub summary: Option<String>,

    /// Polarity in [-1, 1]
    pub sentiment: Option<f64>,
}

/// Black-box enrichment service
#[async_trait]
pub trait EnrichmentOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, text: &str, title: Option<&str>) -> Result<Enrichment, OracleError>;
}

const STOP_WORDS_EN: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "new", "now", "see", "who",
    "did", "get", "him", "she", "too", "use", "that", "with", "this", "from", "they", "will",
    "would", "there", "their", "what", "about", "which", "when", "were", "been", "than", "them",
    "then", "into", "more", "some", "also", "only", "over", "such", "just", "like", "said",
    "is", "it", "of", "to", "in", "on", "a", "an", "as", "at", "be", "by", "or", "if", "so",
];
const STOP_WORDS_DE: &[&str] = &[
    "der", "die", "das", "und", "ist", "nicht", "mit", "ein", "eine", "auf", "den", "von", "zu",
    "sich", "des", "auch", "es", "im",
];
const STOP_WORDS_FR: &[&str] = &[
    "le", "la", "les", "et", "des", "est", "une", "un", "du", "pour", "que", "qui", "dans", "pas",
    "sur", "au", "avec",
];
const STOP_WORDS_ES: &[&str] = &[
    "el", "los", "las", "y", "es", "una", "un", "del", "para", "que", "por", "con", "como", "pero",
    "su", "al", "se",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "best", "love", "happy", "success", "win", "improve", "positive",
    "benefit", "strong", "growth", "wonderful",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "worst", "hate", "sad", "fail", "failure", "loss", "decline", "negative",
    "weak", "crisis", "problem", "terrible",
];

/// Heuristic oracle based on word frequencies
#[derive(Debug, Clone)]
pub struct FrequencyOracle {
    max_keywords: usize,
    summary_sentences: usize,
}

impl FrequencyOracle {
    pub fn new(max_keywords: usize, summary_sentences: usize) -> Self {
        Self {
            max_keywords,
            summary_sentences: summary_sentences.max(1),
        }
    }

    /// Most frequent non stop-words, ties broken alphabetically
    pub fn keywords(&self, words: &[String]) -> Vec<String> {
        let stop: HashSet<&str> = STOP_WORDS_EN.iter().copied().collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for word in words {
            if word.chars().count() < 3 || stop.contains(word.as_str()) {
                continue;
            }
            if word.chars().all(|c| c.is_numeric()) {
                continue;
            }
            *counts.entry(word.as_str()).or_insert(0) += 1;
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word.to_string())
            .collect()
    }

    /// The first few sentences of the text
    pub fn summary(&self, text: &str) -> Option<String> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return None;
        }
        Some(
            sentences
                .into_iter()
                .take(self.summary_sentences)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// Guesses the language by stop-word overlap
    pub fn language(&self, words: &[String]) -> Option<String> {
        let candidates = [
            ("en", STOP_WORDS_EN),
            ("de", STOP_WORDS_DE),
            ("fr", STOP_WORDS_FR),
            ("es", STOP_WORDS_ES),
        ];

        let (code, hits) = candidates
            .iter()
            .map(|(code, stop)| {
                let hits = words.iter().filter(|w| stop.contains(&w.as_str())).count();
                (*code, hits)
            })
            .max_by_key(|(_, hits)| *hits)?;

        // A handful of function words is needed before guessing
        if hits >= 3 && hits * 20 >= words.len() {
            Some(code.to_string())
        } else {
            None
        }
    }

    /// Lexicon polarity, or `None` when no opinion words occur
    pub fn sentiment(&self, words: &[String]) -> Option<f64> {
        let positive = words
            .iter()
            .filter(|w| POSITIVE_WORDS.contains(&w.as_str()))
            .count() as f64;
        let negative = words
            .iter()
            .filter(|w| NEGATIVE_WORDS.contains(&w.as_str()))
            .count() as f64;

        if positive + negative == 0.0 {
            None
        } else {
            Some((positive - negative) / (positive + negative))
        }
    }

    /// Length, sentence count and vocabulary richness combined into [0, 1]
    pub fn quality(&self, words: &[String], sentences: usize, has_title: bool) -> f64 {
        if words.is_empty() {
            return 0.0;
        }

        let length = (words.len() as f64 / 300.0).min(1.0);
        let structure = (sentences as f64 / 5.0).min(1.0);
        let distinct: HashSet<&String> = words.iter().collect();
        let richness = (distinct.len() as f64 / words.len() as f64 * 2.0).min(1.0);
        let title = if has_title { 1.0 } else { 0.0 };

        (0.4 * length + 0.25 * structure + 0.25 * richness + 0.1 * title).clamp(0.0, 1.0)
    }
}

impl Default for FrequencyOracle {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

#[async_trait]
impl EnrichmentOracle for FrequencyOracle {
    fn name(&self) -> &str {
        "frequency"
    }

    async fn enrich(&self, text: &str, title: Option<&str>) -> Result<Enrichment, OracleError> {
        if text.trim().is_empty() {
            return Err(OracleError::InvalidInput("no text to enrich".to_string()));
        }

        let words = tokenize(text);
        let sentences = split_sentences(text).len();
        let has_title = title.map(|t| !t.trim().is_empty()).unwrap_or(false);

        Ok(Enrichment {
            quality_score: self.quality(&words, sentences, has_title),
            language: self.language(&words),
            keywords: self.keywords(&words),
            summary: self.summary(text),
            sentiment: self.sentiment(&words),
        })
    }
}

/// Lowercased alphanumeric tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let sentence = crate::extract::dom::collapse_whitespace(&current);
            if sentence.split_whitespace().count() >= 3 {
                sentences.push(sentence);
            }
            current.clear();
        }
    }

    let rest = crate::extract::dom::collapse_whitespace(&current);
    if rest.split_whitespace().count() >= 3 {
        sentences.push(rest);
    }
    sentences
}
