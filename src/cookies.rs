//! Session cookie jar
//!
//! Cookies are kept as plain `name=value` pairs. Attributes (`Path`,
//! `Domain`, `Expires`, `HttpOnly`, `SameSite`) are discarded and nothing
//! expires: the proxy session lives as long as the process.

/// Ordered cookie store, serialized as a `Cookie` request header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` header value (`a=1; b=2`).
    pub fn from_header(header: &str) -> Self {
        let mut jar = Self::new();
        for pair in header.split(';') {
            if let Some((name, value)) = split_pair(pair) {
                jar.set(name, value);
            }
        }
        jar
    }

    /// Insert or overwrite a cookie.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Merge raw `Set-Cookie` header values; later values win.
    ///
    /// Returns the number of cookies applied.
    pub fn absorb<S: AsRef<str>>(&mut self, set_cookies: &[S]) -> usize {
        let mut applied = 0;
        for raw in set_cookies {
            for cookie in split_combined(raw.as_ref()) {
                let pair = cookie.split(';').next().unwrap_or_default();
                if let Some((name, value)) = split_pair(pair) {
                    self.set(name, value);
                    applied += 1;
                }
            }
        }
        applied
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Cookie names in discovery order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Serialize as a `Cookie` header value.
    pub fn header_value(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Merge `Set-Cookie` values into an existing `Cookie` header value.
pub fn merge<S: AsRef<str>>(current: &str, set_cookies: &[S]) -> String {
    let mut jar = CookieJar::from_header(current);
    jar.absorb(set_cookies);
    jar.header_value()
}

/// Split `name=value` on the first `=`; entries without `=` or name are dropped.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

/// Split a folded `Set-Cookie` value (`a=1; Path=/, b=2`) into cookies.
///
/// A comma only starts a new cookie when the text after it looks like
/// `token=...`, so `Expires=Wed, 21 Oct 2015 07:28:00 GMT` stays intact.
fn split_combined(raw: &str) -> Vec<&str> {
    let mut cookies = Vec::new();
    let mut start = 0;

    for (idx, _) in raw.match_indices(',') {
        let rest = &raw[idx + 1..];
        if starts_new_cookie(rest) {
            cookies.push(raw[start..idx].trim());
            start = idx + 1;
        }
    }
    cookies.push(raw[start..].trim());
    cookies.retain(|c| !c.is_empty());
    cookies
}

fn starts_new_cookie(rest: &str) -> bool {
    let head = rest.split([';', ',']).next().unwrap_or_default();
    match head.split_once('=') {
        Some((name, _)) => {
            let name = name.trim();
            !name.is_empty() && !name.contains(char::is_whitespace)
        }
        None => false,
    }
}
