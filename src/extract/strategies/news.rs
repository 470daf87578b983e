use super::{author, evidence, first_of, headline, published_date, put_list, put_text};
use crate::classifier::PageType;
use crate::extract::{dom, ContentExtractor, Fields};
use scraper::Html;
use url::Url;

/// Extractor for news stories and long-form articles
pub struct NewsExtractor;

impl ContentExtractor for NewsExtractor {
    fn name(&self) -> &str {
        "news"
    }

    fn page_types(&self) -> Vec<PageType> {
        vec![PageType::News, PageType::Article]
    }

    fn extract(&self, document: &Html, _url: &Url) -> Fields {
        let mut fields = Fields::new();

        put_text(&mut fields, "headline", headline(document));
        put_text(&mut fields, "author", author(document));
        put_text(&mut fields, "published", published_date(document));
        put_text(
            &mut fields,
            "modified",
            dom::meta_content(document, "article:modified_time"),
        );
        put_text(
            &mut fields,
            "section",
            dom::meta_content(document, "article:section"),
        );
        put_text(
            &mut fields,
            "lead",
            first_of(
                document,
                &[
                    ".lead, .standfirst, .summary",
                    "[itemprop=articleBody] p",
                    "article p",
                ],
            ),
        );
        put_list(&mut fields, "tags", tags(document));

        fields
    }

    /// Headline, byline, dateline and article body markup
    fn confidence_score(&self, document: &Html) -> f64 {
        let structure = evidence(
            document,
            &[
                "article, [itemprop=articleBody]",
                "h1",
                "time[datetime], .dateline",
                ".byline, [rel=author], .author, [itemprop=author]",
            ],
        );
        let has_meta = published_date(document).is_some() || author(document).is_some();

        (0.8 * structure + if has_meta { 0.2 } else { 0.0 }).clamp(0.0, 1.0)
    }
}

fn tags(document: &Html) -> Vec<String> {
    let from_keywords = dom::meta_content(document, "news_keywords")
        .or_else(|| dom::meta_content(document, "keywords"))
        .map(|keywords| {
            keywords
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if from_keywords.is_empty() {
        dom::all_texts(document, ".tags a, [rel=tag]")
    } else {
        from_keywords
    }
}
