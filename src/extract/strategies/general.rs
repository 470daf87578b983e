use super::{put_list, put_text};
use crate::classifier::PageType;
use crate::extract::{dom, ContentExtractor, Fields, GENERAL_EXTRACTOR};
use scraper::Html;
use url::Url;

/// Page-type agnostic extractor used as the fallback for every page
///
/// Pulls the title, description, headings, language and outgoing links.
pub struct GeneralExtractor;

impl ContentExtractor for GeneralExtractor {
    fn name(&self) -> &str {
        GENERAL_EXTRACTOR
    }

    fn page_types(&self) -> Vec<PageType> {
        vec![PageType::Unknown, PageType::Documentation]
    }

    fn extract(&self, document: &Html, url: &Url) -> Fields {
        let mut fields = Fields::new();

        put_text(
            &mut fields,
            "title",
            dom::title(document).or_else(|| dom::first_text(document, "h1")),
        );
        put_text(
            &mut fields,
            "description",
            dom::meta_content(document, "description")
                .or_else(|| dom::meta_content(document, "og:description")),
        );
        put_text(
            &mut fields,
            "language",
            dom::first_attr(document, "html[lang]", "lang"),
        );
        put_text(
            &mut fields,
            "canonical_url",
            dom::first_attr(document, "link[rel='canonical']", "href")
                .and_then(|href| dom::resolve_link(&href, url)),
        );
        put_list(&mut fields, "headings", dom::all_texts(document, "h1, h2, h3"));
        put_list(&mut fields, "links", dom::extract_links(document, url));

        put_text(
            &mut fields,
            "image",
            dom::meta_content(document, "og:image")
                .or_else(|| dom::first_attr(document, "img[src]", "src"))
                .and_then(|src| dom::resolve_link(&src, url)),
        );

        fields
    }

    /// Evidence from the title, description and amount of paragraph text
    fn confidence_score(&self, document: &Html) -> f64 {
        let mut score = 0.0;

        if dom::title(document).is_some() {
            score += 0.25;
        }
        if dom::meta_content(document, "description").is_some()
            || dom::meta_content(document, "og:description").is_some()
        {
            score += 0.15;
        }

        let words: usize = dom::all_texts(document, "p")
            .iter()
            .map(|p| dom::word_count(p))
            .sum();
        score += 0.6 * (words as f64 / 200.0).min(1.0);

        score.clamp(0.0, 1.0)
    }
}
