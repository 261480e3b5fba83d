//! URL normalization against the upstream origin

use url::Url;

/// Make `maybe_relative` absolute against `origin`.
///
/// Absolute `http(s)` URLs pass through; `/path` and bare `path` are both
/// anchored at the origin root. Empty input yields `None`.
pub fn absolute_url(origin: &str, maybe_relative: &str) -> Option<String> {
    let value = maybe_relative.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }

    let origin = origin.trim_end_matches('/');
    if value.starts_with('/') {
        Some(format!("{origin}{value}"))
    } else {
        Some(format!("{origin}/{value}"))
    }
}

/// Like [`absolute_url`], but protocol-relative `//host/..` gets `https:` and
/// `data:` URIs are kept verbatim.
pub fn normalize_image_url(origin: &str, raw: &str) -> Option<String> {
    if let Some(rest) = raw.trim().strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if raw.starts_with("data:") {
        return Some(raw.to_string());
    }
    absolute_url(origin, raw)
}

/// Resolve a `Location` header against the URL of the request that produced it.
///
/// Uses RFC 3986 joining so `list.do`, `../x` and `?q` behave; falls back to
/// [`absolute_url`] when `base` itself does not parse.
pub fn resolve_location(base: &str, location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    match Url::parse(base).and_then(|base| base.join(location)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => absolute_url(base, location),
    }
}
