//! URL normalization used to key learned knowledge.

use url::Url;

/// Placeholder for collapsed identifier segments.
const ID_PLACEHOLDER: &str = "{id}";

/// Normalized site identifier: host (without `www.`) plus the path with
/// numeric or opaque identifier segments collapsed. Query strings and
/// fragments are dropped.
///
/// `https://www.social.test/pages/12345/about?ref=x` -> `social.test/pages/{id}/about`
pub fn url_pattern(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return fallback_pattern(raw);
    };

    let host = normalize_host(url.host_str().unwrap_or_default());
    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(template_segment)
                .collect()
        })
        .unwrap_or_default();

    if segments.is_empty() {
        host
    } else {
        format!("{host}/{}", segments.join("/"))
    }
}

/// Lowercased host of `raw`, without `www.`; the trimmed input if it has none.
pub fn host_of(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|url| url.host_str().map(normalize_host))
        .unwrap_or_else(|| raw.trim().to_lowercase())
}

fn normalize_host(host: &str) -> String {
    let host = host.to_lowercase();
    host.strip_prefix("www.").map(ToString::to_string).unwrap_or(host)
}

fn template_segment(segment: &str) -> String {
    let is_numeric = segment.chars().all(|c| c.is_ascii_digit());
    let digits = segment.chars().filter(char::is_ascii_digit).count();
    let is_opaque = segment.len() >= 12 && digits * 2 >= segment.len();

    if is_numeric || is_opaque {
        ID_PLACEHOLDER.to_string()
    } else {
        segment.to_lowercase()
    }
}

fn fallback_pattern(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    without_query
        .split('/')
        .filter(|s| !s.is_empty())
        .map(template_segment)
        .collect::<Vec<_>>()
        .join("/")
}
