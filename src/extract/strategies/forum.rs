use super::{evidence, first_of, put_text};
use crate::classifier::PageType;
use crate::extract::{dom, ContentExtractor, Fields};
use scraper::Html;
use serde_json::{json, Value};
use url::Url;

const POST_SELECTOR: &str = ".post, .message, [itemprop=comment], .topic-post";

/// Extractor for forum threads
pub struct ForumExtractor;

impl ContentExtractor for ForumExtractor {
    fn name(&self) -> &str {
        "forum"
    }

    fn page_types(&self) -> Vec<PageType> {
        vec![PageType::Forum]
    }

    fn extract(&self, document: &Html, _url: &Url) -> Fields {
        let mut fields = Fields::new();

        put_text(
            &mut fields,
            "thread_title",
            first_of(document, &[".thread-title", ".topic-title", "h1"])
                .or_else(|| dom::title(document)),
        );

        let posts = posts(document);
        if !posts.is_empty() {
            fields.insert("post_count".to_string(), Value::from(posts.len()));
            fields.insert(
                "reply_count".to_string(),
                Value::from(posts.len().saturating_sub(1)),
            );
            fields.insert("posts".to_string(), Value::Array(posts));
        }

        fields
    }

    /// Post containers, thread markup, replies and poster names
    fn confidence_score(&self, document: &Html) -> f64 {
        let structure = evidence(
            document,
            &[
                POST_SELECTOR,
                ".thread, .topic",
                ".reply, .replies",
                ".username, .user-name, .poster",
            ],
        );
        // A thread has more than one post
        let many_posts = if dom::count(document, POST_SELECTOR) > 1 {
            0.2
        } else {
            0.0
        };
        (0.8 * structure + many_posts).clamp(0.0, 1.0)
    }
}

/// Author, timestamp and text of every post in page order
fn posts(document: &Html) -> Vec<Value> {
    let (Some(post), Some(user), Some(body), Some(time)) = (
        dom::selector(POST_SELECTOR),
        dom::selector(".username, .user-name, .poster, .author"),
        dom::selector(".post-body, .message-body, .content, [itemprop=text]"),
        dom::selector("time[datetime]"),
    ) else {
        return Vec::new();
    };

    document
        .select(&post)
        .filter_map(|element| {
            let text = element
                .select(&body)
                .next()
                .map(|b| dom::element_text(&b))
                .unwrap_or_else(|| dom::element_text(&element));
            if text.is_empty() {
                return None;
            }

            let author = element.select(&user).next().map(|u| dom::element_text(&u));
            let posted = element
                .select(&time)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(str::to_string);

            Some(json!({ "author": author, "posted": posted, "text": text }))
        })
        .collect()
}
