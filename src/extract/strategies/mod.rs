//! Built-in extraction strategies

mod blog;
mod forum;
mod general;
mod news;
mod product;

pub use blog::BlogExtractor;
pub use forum::ForumExtractor;
pub use general::GeneralExtractor;
pub use news::NewsExtractor;
pub use product::ProductExtractor;

use crate::extract::{dom, Fields};
use chrono::{DateTime, NaiveDate};
use scraper::Html;
use serde_json::Value;

/// Inserts a string field when a value was found
fn put_text(fields: &mut Fields, key: &str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        fields.insert(key.to_string(), Value::String(value));
    }
}

/// Inserts a list field when it is non-empty
fn put_list(fields: &mut Fields, key: &str, values: Vec<String>) {
    if !values.is_empty() {
        fields.insert(key.to_string(), values.into());
    }
}

/// First non-empty text among several selectors, tried in order
fn first_of(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .find_map(|css| dom::first_text(document, css))
}

/// Fraction of `selectors` present in the document
fn evidence(document: &Html, selectors: &[&str]) -> f64 {
    if selectors.is_empty() {
        return 0.0;
    }
    let found = selectors
        .iter()
        .filter(|css| dom::count(document, css) > 0)
        .count();
    found as f64 / selectors.len() as f64
}

/// Publication date from the usual meta tags or a `<time>` element
///
/// RFC 3339 timestamps and plain dates are normalized; anything else is kept
/// as written.
fn published_date(document: &Html) -> Option<String> {
    let raw = [
        "article:published_time",
        "datePublished",
        "pubdate",
        "date",
        "dc.date",
    ]
    .iter()
    .find_map(|name| dom::meta_content(document, name))
    .or_else(|| dom::first_attr(document, "[itemprop=datePublished]", "content"))
    .or_else(|| dom::first_attr(document, "time[datetime]", "datetime"))?;

    Some(normalize_date(&raw))
}

fn normalize_date(raw: &str) -> String {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.to_rfc3339();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

/// Author from meta tags or common byline markup
fn author(document: &Html) -> Option<String> {
    dom::meta_content(document, "author")
        .or_else(|| dom::meta_content(document, "article:author"))
        .or_else(|| {
            first_of(
                document,
                &[
                    "[itemprop=author] [itemprop=name]",
                    "[itemprop=author]",
                    "[rel=author]",
                    ".byline",
                    ".author",
                    ".post-author",
                ],
            )
        })
        .map(|name| strip_by_prefix(&name))
}

fn strip_by_prefix(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("by ") => trimmed[3..].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Headline from Open Graph, the first `<h1>` or the document title
fn headline(document: &Html) -> Option<String> {
    dom::meta_content(document, "og:title")
        .or_else(|| dom::first_text(document, "h1"))
        .or_else(|| dom::title(document))
}
