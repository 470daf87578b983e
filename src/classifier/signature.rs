use crate::classifier::PageType;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;

/// A `<meta>` tag the page is expected to carry
#[derive(Debug, Clone)]
pub struct MetaIndicator {
    /// Matched against the tag's `name` or `property` attribute
    pub name: String,

    /// When set, the tag content must contain this (case-insensitive)
    pub value: Option<String>,
}

/// Indicators that identify one page type
///
/// Each indicator list is scored as the fraction of its entries found on the
/// page; an empty list scores zero.
#[derive(Debug, Clone)]
pub struct PageSignature {
    pub page_type: PageType,
    pub url_patterns: Vec<Regex>,
    pub keywords: Vec<String>,
    pub selectors: Vec<Selector>,
    pub meta_tags: Vec<MetaIndicator>,
}

impl PageSignature {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            url_patterns: Vec::new(),
            keywords: Vec::new(),
            selectors: Vec::new(),
            meta_tags: Vec::new(),
        }
    }

    /// Adds URL regexes (matched case-insensitively)
    pub fn with_url_patterns(mut self, patterns: &[&str]) -> Result<Self, ConfigError> {
        for pattern in patterns {
            let regex = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
                ConfigError::InvalidPattern(format!("URL pattern '{}': {}", pattern, e))
            })?;
            self.url_patterns.push(regex);
        }
        Ok(self)
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords
            .extend(keywords.iter().map(|k| k.to_lowercase()));
        self
    }

    pub fn with_selectors(mut self, selectors: &[&str]) -> Result<Self, ConfigError> {
        for css in selectors {
            let selector = Selector::parse(css).map_err(|e| {
                ConfigError::InvalidPattern(format!("CSS selector '{}': {}", css, e))
            })?;
            self.selectors.push(selector);
        }
        Ok(self)
    }

    pub fn with_meta_tags(mut self, tags: &[(&str, Option<&str>)]) -> Self {
        self.meta_tags.extend(tags.iter().map(|(name, value)| MetaIndicator {
            name: name.to_string(),
            value: value.map(|v| v.to_lowercase()),
        }));
        self
    }
}

/// Signatures for the built-in page types, in registration order
pub fn builtin_signatures() -> Result<Vec<PageSignature>, ConfigError> {
    Ok(vec![
        PageSignature::new(PageType::News)
            .with_url_patterns(&[r"/news/", r"/\d{4}/\d{2}/\d{2}/", r"/story/", r"/breaking"])?
            .with_keywords(&["news", "breaking", "reporter", "headline"])
            .with_selectors(&[
                "article",
                "time[datetime]",
                ".byline, [rel=author], .author",
                ".dateline, .news-meta",
            ])?
            .with_meta_tags(&[
                ("og:type", Some("article")),
                ("article:published_time", None),
                ("news_keywords", None),
            ]),
        PageSignature::new(PageType::Blog)
            .with_url_patterns(&[r"/blog", r"/posts?/", r"/\d{4}/\d{2}/[^/]+"])?
            .with_keywords(&["blog", "post", "thoughts", "diary"])
            .with_selectors(&[
                ".post, .blog-post, .entry",
                ".comments, #comments",
                ".tags, .post-tags, [rel=tag]",
                ".author, .post-author",
            ])?
            .with_meta_tags(&[("og:type", Some("article")), ("generator", None)]),
        PageSignature::new(PageType::Product)
            .with_url_patterns(&[r"/products?/", r"/item/", r"/p/", r"/dp/", r"/shop/"])?
            .with_keywords(&["buy", "price", "shop", "cart", "shipping"])
            .with_selectors(&[
                "[itemtype*='schema.org/Product']",
                ".price, [itemprop=price]",
                ".add-to-cart, #add-to-cart, button[name=add-to-cart]",
                ".product-title, .product-name, [itemprop=name]",
            ])?
            .with_meta_tags(&[("og:type", Some("product")), ("product:price:amount", None)]),
        PageSignature::new(PageType::Article)
            .with_url_patterns(&[r"/articles?/", r"/a/", r"/features?/"])?
            .with_keywords(&["article", "analysis", "feature", "opinion"])
            .with_selectors(&[
                "article",
                "article h1",
                "article p",
                "[itemprop=articleBody], .article-body",
            ])?
            .with_meta_tags(&[
                ("og:type", Some("article")),
                ("author", None),
                ("article:author", None),
            ]),
        PageSignature::new(PageType::Forum)
            .with_url_patterns(&[r"/forums?/", r"/threads?/", r"/topics?/", r"/t/", r"/community/"])?
            .with_keywords(&["forum", "discussion", "thread", "reply", "community"])
            .with_selectors(&[
                ".post, .message",
                ".thread, .topic",
                ".reply, .replies",
                ".username, .user-name, .poster",
            ])?
            .with_meta_tags(&[("generator", Some("discourse")), ("og:site_name", Some("forum"))]),
        PageSignature::new(PageType::Documentation)
            .with_url_patterns(&[r"/docs?/", r"/documentation/", r"/api/", r"/reference/", r"/guides?/", r"/manual/"])?
            .with_keywords(&["documentation", "docs", "api", "reference", "guide", "tutorial"])
            .with_selectors(&[
                ".sidebar, .toc, #toc, nav.docs-nav",
                "pre code",
                ".docs-content, .documentation, .markdown-body",
                "h2[id], h3[id]",
            ])?
            .with_meta_tags(&[("docsearch:language", None), ("generator", None)]),
    ])
}
