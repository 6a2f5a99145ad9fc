//! URL and host normalization shared by the email engine and coordinator.

use url::Url;

/// Parse a website cell, defaulting the scheme to https.
pub fn parse_site_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if is_http_url(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).ok()?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

/// Origin (scheme + host + non-default port) of a website cell.
pub fn normalize_origin(raw: &str) -> Option<String> {
    parse_site_url(raw).map(|url| url.origin().ascii_serialization())
}

/// Lowercase host of a website cell; the cache key.
pub fn host_key(raw: &str) -> Option<String> {
    parse_site_url(raw).and_then(|url| url.host_str().map(|h| h.to_lowercase()))
}

/// Host without a leading `www.`, or empty when the URL cannot be parsed.
pub fn site_domain(raw: &str) -> String {
    match host_key(raw) {
        Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
        None => String::new(),
    }
}

/// Resolve `path` against `base`.
pub fn join_url(base: &str, path: &str) -> Option<String> {
    Url::parse(base).ok()?.join(path).ok().map(|u| u.to_string())
}

pub fn is_http_url(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
