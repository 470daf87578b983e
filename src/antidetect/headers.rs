use rand::seq::SliceRandom;
use rand::Rng;
use url::Url;

const REFERER_PROBABILITY: f64 = 0.30;
const CACHE_CONTROL_PROBABILITY: f64 = 0.20;

const SEARCH_REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en-US,en;q=0.8,de;q=0.5"];

/// Builds browser-like request headers for one request
///
/// `User-Agent`, `Accept`, `Accept-Language` and `Accept-Encoding` are always
/// present. `Referer` is added 30% of the time, pointing either at a search
/// engine or at the target site's root; `Cache-Control: max-age=0` 20% of the
/// time. Caller supplied headers replace generated ones with the same name
/// (case-insensitive).
pub fn build_headers<R: Rng>(
    user_agent: &str,
    target: &Url,
    custom: &[(String, String)],
    rng: &mut R,
) -> Vec<(String, String)> {
    let mut headers = vec![
        ("User-Agent".to_string(), user_agent.to_string()),
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        (
            "Accept-Language".to_string(),
            ACCEPT_LANGUAGES
                .choose(rng)
                .unwrap_or(&ACCEPT_LANGUAGES[0])
                .to_string(),
        ),
        ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
    ];

    if rng.gen_bool(REFERER_PROBABILITY) {
        let referer = if rng.gen_bool(0.5) {
            SEARCH_REFERERS
                .choose(rng)
                .unwrap_or(&SEARCH_REFERERS[0])
                .to_string()
        } else {
            site_root(target)
        };
        headers.push(("Referer".to_string(), referer));
    }

    if rng.gen_bool(CACHE_CONTROL_PROBABILITY) {
        headers.push(("Cache-Control".to_string(), "max-age=0".to_string()));
    }

    for (name, value) in custom {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        headers.push((name.clone(), value.clone()));
    }

    headers
}

fn site_root(target: &Url) -> String {
    format!("{}://{}/", target.scheme(), target.host_str().unwrap_or_default())
}

/// Case-insensitive header lookup
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
