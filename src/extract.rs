//! Fallback extraction chains over detail-page markup
//!
//! A chain is a fixed-priority slice of [`Stage`]s. Each stage is a pure
//! `text -> Option<String>` function; the first stage that yields a value
//! wins and later stages never run. A stage that finds nothing is not an
//! error.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;

static VOD_URL_ENCODED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)vodUrl_m\s*:\s*encodeURI\(\s*"([^"]+)"\s*\)"#).unwrap()
});

static VOD_URL_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)vodUrl_m\s*:\s*"([^"]+)""#).unwrap());

static VOD_PROXY_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/vod-proxy/[^"'\s\\]+playlist\.m3u8"#).unwrap());

static POST_IMAGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)postImageUrl\s*:\s*['"]([^'"]+)['"]"#).unwrap());

/// Host-dependent patterns, compiled once per configuration.
#[derive(Debug, Clone)]
pub struct Patterns {
    stream_host: String,
    stream_m3u8: Regex,
    stream_mp4: Regex,
    catalog_image: Regex,
}

impl Patterns {
    pub fn new(config: &Config) -> Result<Self, regex::Error> {
        let stream_host = config.stream_host().to_string();
        let host = regex::escape(strip_scheme(&stream_host));
        let image_host = regex::escape(strip_scheme(config.image_host.trim_end_matches('/')));

        Ok(Self {
            stream_m3u8: Regex::new(&format!(r#"https?://{host}/[^"'\s\\]+\.m3u8"#))?,
            stream_mp4: Regex::new(&format!(r#"https?://{host}/[^"'\s\\]+\.mp4[^"'\s\\]*"#))?,
            catalog_image: Regex::new(&format!(
                r#"(?i)https?://{image_host}/[^"'\s\\]+/Catalog/\d+\.jpg"#
            ))?,
            stream_host,
        })
    }

    /// Catalog thumbnail URL anywhere in `text`.
    pub fn catalog_image(&self, text: &str) -> Option<String> {
        self.catalog_image.find(text).map(|m| m.as_str().to_string())
    }
}

fn strip_scheme(host: &str) -> &str {
    host.trim_start_matches("https://").trim_start_matches("http://")
}

/// One named extraction strategy.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub run: fn(&Patterns, &str) -> Option<String>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

/// Stream URL strategies, highest priority first.
pub const STREAM_CHAIN: &[Stage] = &[
    Stage {
        name: "direct-m3u8",
        run: direct_m3u8,
    },
    Stage {
        name: "vod-url-encoded",
        run: vod_url_encoded,
    },
    Stage {
        name: "vod-url-bare",
        run: vod_url_bare,
    },
    Stage {
        name: "mp4-playlist",
        run: mp4_playlist,
    },
    Stage {
        name: "vod-proxy",
        run: vod_proxy,
    },
];

/// Detail-page thumbnail strategies, highest priority first.
pub const THUMBNAIL_CHAIN: &[Stage] = &[
    Stage {
        name: "post-image-url",
        run: post_image_url,
    },
    Stage {
        name: "catalog-image",
        run: catalog_image,
    },
];

/// Run `chain` over `text`, returning the winning stage name and value.
pub fn first_match(
    chain: &[Stage],
    patterns: &Patterns,
    text: &str,
) -> Option<(&'static str, String)> {
    chain
        .iter()
        .find_map(|stage| (stage.run)(patterns, text).map(|value| (stage.name, value)))
}

fn direct_m3u8(patterns: &Patterns, html: &str) -> Option<String> {
    patterns.stream_m3u8.find(html).map(|m| m.as_str().to_string())
}

fn vod_url_encoded(_: &Patterns, html: &str) -> Option<String> {
    capture(&VOD_URL_ENCODED, html)
}

fn vod_url_bare(_: &Patterns, html: &str) -> Option<String> {
    capture(&VOD_URL_BARE, html)
}

fn mp4_playlist(patterns: &Patterns, html: &str) -> Option<String> {
    patterns
        .stream_mp4
        .find(html)
        .map(|m| playlist_for_mp4(m.as_str()))
}

fn vod_proxy(patterns: &Patterns, html: &str) -> Option<String> {
    VOD_PROXY_PATH
        .find(html)
        .map(|m| format!("{}{}", patterns.stream_host, m.as_str()))
}

fn post_image_url(_: &Patterns, html: &str) -> Option<String> {
    capture(&POST_IMAGE_URL, html)
}

fn catalog_image(patterns: &Patterns, html: &str) -> Option<String> {
    patterns.catalog_image(html)
}

/// The HLS playlist sitting next to an mp4 on the streaming host.
pub fn playlist_for_mp4(mp4_url: &str) -> String {
    if mp4_url.contains("playlist.m3u8") {
        mp4_url.to_string()
    } else if mp4_url.ends_with('/') {
        format!("{mp4_url}playlist.m3u8")
    } else {
        format!("{mp4_url}/playlist.m3u8")
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
