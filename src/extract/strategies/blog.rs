use super::{author, evidence, first_of, published_date, put_list, put_text};
use crate::classifier::PageType;
use crate::extract::{dom, ContentExtractor, Fields};
use scraper::Html;
use serde_json::Value;
use url::Url;

/// Extractor for blog posts
pub struct BlogExtractor;

impl ContentExtractor for BlogExtractor {
    fn name(&self) -> &str {
        "blog"
    }

    fn page_types(&self) -> Vec<PageType> {
        vec![PageType::Blog]
    }

    fn extract(&self, document: &Html, _url: &Url) -> Fields {
        let mut fields = Fields::new();

        put_text(
            &mut fields,
            "title",
            first_of(document, &[".entry-title", ".post-title", "article h1", "h1"])
                .or_else(|| dom::title(document)),
        );
        put_text(&mut fields, "author", author(document));
        put_text(&mut fields, "published", published_date(document));
        put_list(
            &mut fields,
            "tags",
            dedup(dom::all_texts(document, "[rel=tag], .tags a, .post-tags a")),
        );
        put_list(
            &mut fields,
            "categories",
            dedup(dom::all_texts(document, "[rel='category tag'], .categories a, .cat-links a")),
        );

        let comments = dom::count(document, ".comment, .comments li, #comments li");
        if comments > 0 {
            fields.insert("comment_count".to_string(), Value::from(comments));
        }

        fields
    }

    /// Post container, title, date, tags and comment markup
    fn confidence_score(&self, document: &Html) -> f64 {
        evidence(
            document,
            &[
                ".post, .blog-post, .entry, article",
                ".entry-title, .post-title, h1",
                "time[datetime], .post-date, .entry-date",
                "[rel=tag], .tags, .post-tags",
                ".comments, #comments, .comment",
            ],
        )
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
