//! DOM helpers shared by the classifier and the extractors
//!
//! Everything here works on an already parsed [`Html`] document and never
//! fails: missing elements simply produce `None` or empty collections.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Parses a CSS selector, returning `None` for invalid input
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapses runs of whitespace into single spaces and trims the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element with whitespace collapsed
pub fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Text of the first element matching `css`, if it is non-empty
pub fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .map(|element| element_text(&element))
        .find(|text| !text.is_empty())
}

/// Non-empty texts of every element matching `css`
pub fn all_texts(document: &Html, css: &str) -> Vec<String> {
    let Some(selector) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|element| element_text(&element))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Value of `attr` on the first element matching `css`
pub fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Number of elements matching `css`
pub fn count(document: &Html, css: &str) -> usize {
    selector(css)
        .map(|selector| document.select(&selector).count())
        .unwrap_or(0)
}

/// Content of a `<meta>` tag looked up by `name` or `property`
pub fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = selector("meta[content]")?;
    document
        .select(&selector)
        .find(|element| {
            let value = element.value();
            value
                .attr("name")
                .or_else(|| value.attr("property"))
                .map(|key| key.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
}

/// Extracts the page title from the HTML document
pub fn title(document: &Html) -> Option<String> {
    first_text(document, "title")
}

/// Whether the element sits inside page chrome (navigation, header, footer, aside)
pub fn inside_chrome(element: &ElementRef) -> bool {
    element.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        matches!(
            ancestor.value().name(),
            "nav" | "header" | "footer" | "aside" | "form"
        )
    })
}

/// Extracts all valid links from the HTML document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything that does not resolve to HTTP(S)
///
/// Duplicates are dropped; first occurrence order is kept.
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(absolute) = resolve_link(href, base_url) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    };

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Some(canonical_selector) = selector("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}
