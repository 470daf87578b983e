use crate::UrlError;
use url::Url;

/// Query keys that only carry campaign attribution and never change the page
const ATTRIBUTION_KEYS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Reduces a URL to the spelling used for response cache keys
///
/// Two URLs with the same canonical form are treated as the same resource by
/// the cache. Fetches always use the URL the caller submitted.
///
/// The canonical form keeps the scheme and the full host (a `www.` host and
/// its bare sibling are different origins and may serve different pages). It
/// lowercases the host, resolves `.`/`..` and repeated slashes in the path,
/// drops a trailing slash everywhere but the root, drops the fragment, drops
/// attribution query keys (`utm_*` and a few others) and orders what remains
/// by key.
///
/// # Examples
///
/// ```
/// use sumi_sieve::url::normalize_url;
///
/// let url = normalize_url("https://News.Example.COM/a/../story/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://news.example.com/story");
/// ```
pub fn normalize_url(raw: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(raw).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let query = canonical_query(&url);
    url.set_query(query.as_deref());

    Ok(url)
}

fn canonical_path(path: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                kept.pop();
            }
            other => kept.push(other),
        }
    }
    format!("/{}", kept.join("/"))
}

/// Returns the filtered and ordered query string, or `None` when nothing is left
fn canonical_query(url: &Url) -> Option<String> {
    url.query()?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_attribution_key(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        return None;
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Some(
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

fn is_attribution_key(key: &str) -> bool {
    key.starts_with("utm_") || ATTRIBUTION_KEYS.contains(&key)
}
