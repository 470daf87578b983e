//! Main-text extraction methods and candidate scoring

use crate::config::ExtractionConfig;
use crate::extract::dom;
use scraper::{ElementRef, Html};
use serde::Serialize;

/// Main text produced by one method
#[derive(Debug, Clone, Serialize)]
pub struct TextCandidate {
    pub method: String,
    pub paragraphs: Vec<String>,
    pub score: f64,
}

impl TextCandidate {
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.paragraphs.iter().map(|p| dom::word_count(p)).sum()
    }
}

/// A way of locating the main text of a page
pub trait TextMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// How much this method is trusted before looking at its output
    fn base_confidence(&self) -> f64;

    /// Paragraphs of main text, or `None` when the method finds nothing
    fn extract(&self, document: &Html) -> Option<Vec<String>>;
}

/// Text inside the first semantic content container
pub struct SemanticContainer;

impl TextMethod for SemanticContainer {
    fn name(&self) -> &'static str {
        "semantic_container"
    }

    fn base_confidence(&self) -> f64 {
        0.9
    }

    fn extract(&self, document: &Html) -> Option<Vec<String>> {
        const CONTAINERS: &[&str] = &[
            "[itemprop=articleBody]",
            "article",
            "main",
            "[role=main]",
        ];

        let container = CONTAINERS.iter().find_map(|css| {
            let selector = dom::selector(css)?;
            document.select(&selector).next()
        })?;

        let paragraph = dom::selector("p, li, blockquote, pre")?;
        let mut paragraphs: Vec<String> = container
            .select(&paragraph)
            .map(|p| dom::element_text(&p))
            .filter(|text| !text.is_empty())
            .collect();

        if paragraphs.is_empty() {
            let text = dom::element_text(&container);
            if !text.is_empty() {
                paragraphs.push(text);
            }
        }

        non_empty(paragraphs)
    }
}

/// The block whose direct paragraph children carry the most words
pub struct TextDensity;

impl TextMethod for TextDensity {
    fn name(&self) -> &'static str {
        "text_density"
    }

    fn base_confidence(&self) -> f64 {
        0.75
    }

    fn extract(&self, document: &Html) -> Option<Vec<String>> {
        let blocks = dom::selector("div, section, td, article, main")?;

        let best = document
            .select(&blocks)
            .filter(|block| !dom::inside_chrome(block))
            .map(|block| {
                let paragraphs = direct_paragraphs(&block);
                let words: usize = paragraphs.iter().map(|p| dom::word_count(p)).sum();
                (words, paragraphs)
            })
            .filter(|(words, _)| *words > 0)
            .fold(None::<(usize, Vec<String>)>, |best, candidate| match best {
                Some(current) if current.0 >= candidate.0 => Some(current),
                _ => Some(candidate),
            })?;

        non_empty(best.1)
    }
}

/// Every paragraph on the page outside navigation and footers
pub struct ParagraphSweep;

impl TextMethod for ParagraphSweep {
    fn name(&self) -> &'static str {
        "paragraph_sweep"
    }

    fn base_confidence(&self) -> f64 {
        0.6
    }

    fn extract(&self, document: &Html) -> Option<Vec<String>> {
        let selector = dom::selector("p")?;
        let paragraphs = document
            .select(&selector)
            .filter(|p| !dom::inside_chrome(p))
            .map(|p| dom::element_text(&p))
            .filter(|text| !text.is_empty())
            .collect();
        non_empty(paragraphs)
    }
}

/// The built-in methods in declaration order
pub fn default_methods() -> Vec<Box<dyn TextMethod>> {
    vec![
        Box::new(SemanticContainer),
        Box::new(TextDensity),
        Box::new(ParagraphSweep),
    ]
}

fn direct_paragraphs(block: &ElementRef) -> Vec<String> {
    block
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "p")
        .map(|p| dom::element_text(&p))
        .filter(|text| !text.is_empty())
        .collect()
}

fn non_empty(paragraphs: Vec<String>) -> Option<Vec<String>> {
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs)
    }
}

/// Scores text candidates
///
/// The score is a weighted mean of the method's base confidence, how close
/// the word count is to the ideal range, how regular the paragraphs are and
/// how much the text looks like natural language.
#[derive(Debug, Clone)]
pub struct TextScorer {
    method_weight: f64,
    length_weight: f64,
    structure_weight: f64,
    language_weight: f64,
    min_words: usize,
    max_words: usize,
}

impl TextScorer {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            method_weight: config.method_weight,
            length_weight: config.length_weight,
            structure_weight: config.structure_weight,
            language_weight: config.language_weight,
            min_words: config.min_words.max(1),
            max_words: config.max_words.max(config.min_words.max(1)),
        }
    }

    pub fn score(&self, base_confidence: f64, paragraphs: &[String]) -> f64 {
        let total = self.method_weight + self.length_weight + self.structure_weight + self.language_weight;
        if total <= 0.0 {
            return 0.0;
        }

        let text = paragraphs.join(" ");
        let words = dom::word_count(&text);

        let weighted = self.method_weight * base_confidence.clamp(0.0, 1.0)
            + self.length_weight * self.length_score(words)
            + self.structure_weight * structure_score(paragraphs)
            + self.language_weight * language_score(&text);

        (weighted / total).clamp(0.0, 1.0)
    }

    /// 1.0 inside the ideal range, tapering linearly outside it
    pub fn length_score(&self, words: usize) -> f64 {
        if words == 0 {
            0.0
        } else if words < self.min_words {
            words as f64 / self.min_words as f64
        } else if words > self.max_words {
            self.max_words as f64 / words as f64
        } else {
            1.0
        }
    }

    /// Runs every method and returns the best candidate
    ///
    /// Ties keep the method declared first.
    pub fn best_candidate(
        &self,
        methods: &[Box<dyn TextMethod>],
        document: &Html,
    ) -> Option<TextCandidate> {
        let mut best: Option<TextCandidate> = None;

        for method in methods {
            let Some(paragraphs) = method.extract(document) else {
                continue;
            };
            let score = self.score(method.base_confidence(), &paragraphs);

            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(TextCandidate {
                    method: method.name().to_string(),
                    paragraphs,
                    score,
                });
            }
        }

        best
    }
}

impl Default for TextScorer {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Share of paragraphs that look like prose, damped for very few paragraphs
fn structure_score(paragraphs: &[String]) -> f64 {
    if paragraphs.is_empty() {
        return 0.0;
    }

    let prose = paragraphs
        .iter()
        .filter(|p| (8..=400).contains(&dom::word_count(p)))
        .count() as f64;
    let share = prose / paragraphs.len() as f64;
    let volume = (paragraphs.len() as f64 / 3.0).min(1.0);

    share * volume
}

/// Letter density and word shape of the text
fn language_score(text: &str) -> f64 {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return 0.0;
    }

    let letters = visible.iter().filter(|c| c.is_alphabetic()).count() as f64;
    let letter_ratio = letters / visible.len() as f64;

    let words = dom::word_count(text).max(1) as f64;
    let average_word = visible.len() as f64 / words;
    let shape = if (3.0..=10.0).contains(&average_word) {
        1.0
    } else {
        0.5
    };

    letter_ratio * shape
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| if i % 2 == 0 { "river" } else { "flooded" })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_length_score() {
        let scorer = TextScorer::default();
        assert_eq!(scorer.length_score(0), 0.0);
        assert_eq!(scorer.length_score(25), 0.5);
        assert_eq!(scorer.length_score(50), 1.0);
        assert_eq!(scorer.length_score(5000), 1.0);
        assert_eq!(scorer.length_score(10_000), 0.5);
    }

    #[test]
    fn test_structure_and_language_scores() {
        assert_eq!(structure_score(&[]), 0.0);
        let paragraphs = vec![prose(20), prose(20), prose(20)];
        assert_eq!(structure_score(&paragraphs), 1.0);
        assert!(structure_score(&[prose(2)]) < 0.01);

        assert!(language_score("The river rose overnight and flooded the town.") > 0.9);
        assert!(language_score("12 34 56 78 $$ %% 99") < 0.3);
        assert_eq!(language_score("   "), 0.0);
    }

    #[test]
    fn test_score_is_bounded() {
        let scorer = TextScorer::default();
        let paragraphs = vec![prose(100), prose(100), prose(100)];
        let score = scorer.score(1.0, &paragraphs);
        assert!(score > 0.9 && score <= 1.0, "score {}", score);
        assert!((scorer.score(0.5, &[]) - 0.5 * 0.30 / 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_semantic_container() {
        let doc = Html::parse_document(&format!(
            "<html><body><nav><p>Home About</p></nav><article><p>{}</p><p>{}</p></article></body></html>",
            prose(30),
            prose(30)
        ));
        let paragraphs = SemanticContainer.extract(&doc).unwrap();
        assert_eq!(paragraphs.len(), 2);
    }

    #[test]
    fn test_text_density_picks_densest_block() {
        let doc = Html::parse_document(&format!(
            "<html><body><div class='side'><p>short note</p></div><div class='body'><p>{}</p><p>{}</p></div></body></html>",
            prose(40),
            prose(40)
        ));
        let paragraphs = TextDensity.extract(&doc).unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(dom::word_count(&paragraphs[0]), 40);
    }

    #[test]
    fn test_paragraph_sweep_skips_chrome() {
        let doc = Html::parse_document(
            "<html><body><header><p>Site name</p></header><p>Body text here</p><footer><p>Copyright</p></footer></body></html>",
        );
        assert_eq!(
            ParagraphSweep.extract(&doc).unwrap(),
            vec!["Body text here".to_string()]
        );
    }

    #[test]
    fn test_methods_find_nothing_on_empty_page() {
        let doc = Html::parse_document("<html><body></body></html>");
        for method in default_methods() {
            assert!(method.extract(&doc).is_none(), "{}", method.name());
        }
        assert!(TextScorer::default()
            .best_candidate(&default_methods(), &doc)
            .is_none());
    }

    #[test]
    fn test_best_candidate_prefers_trusted_method() {
        let doc = Html::parse_document(&format!(
            "<html><body><article><p>{}</p><p>{}</p><p>{}</p></article></body></html>",
            prose(60),
            prose(60),
            prose(60)
        ));
        let best = TextScorer::default()
            .best_candidate(&default_methods(), &doc)
            .unwrap();
        assert_eq!(best.method, "semantic_container");
        assert_eq!(best.word_count(), 180);
    }
}
