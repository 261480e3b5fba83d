//! Detail page → HLS playlist resolution

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{ProxyError, ResolveMeta, Result};
use crate::extract::{first_match, Patterns, STREAM_CHAIN, THUMBNAIL_CHAIN};
use crate::http_client::{UpstreamClient, UpstreamRequest};
use crate::login::LoginFlow;
use crate::urls::{absolute_url, normalize_image_url};

/// Path segment the portal serves under two misspellings interchangeably.
///
/// Likely an upstream bug; if it gets fixed one spelling may vanish, and the
/// surviving one is always tried.
const DETAIL_SPELLINGS: [&str; 2] = ["selectOriganlShotDetail", "selectOrignalShotDetail"];

/// A resolved stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "StreamPayload")]
pub struct StreamDescriptor {
    pub stream_url: String,
    pub thumbnail: Option<String>,
    /// Candidate URL whose page yielded the stream
    pub resolved_from: String,
    pub resolved_at: DateTime<Utc>,
}

impl StreamDescriptor {
    pub fn meta(&self) -> ResolveMeta {
        resolve_meta(&self.resolved_from, self.resolved_at)
    }
}

/// Wire shape: `{ m3u8, thumbnail, meta: { detailPage, extractedAt } }`.
#[derive(Serialize)]
struct StreamPayload {
    m3u8: String,
    thumbnail: Option<String>,
    meta: ResolveMeta,
}

impl From<StreamDescriptor> for StreamPayload {
    fn from(descriptor: StreamDescriptor) -> Self {
        let meta = descriptor.meta();
        Self {
            m3u8: descriptor.stream_url,
            thumbnail: descriptor.thumbnail,
            meta,
        }
    }
}

fn resolve_meta(detail_page: &str, at: DateTime<Utc>) -> ResolveMeta {
    ResolveMeta {
        detail_page: detail_page.to_string(),
        extracted_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Every URL spelling worth trying for `reference`, in order, without duplicates.
pub fn candidate_urls(reference: &str) -> Vec<String> {
    let mut candidates = vec![reference.to_string()];
    let [first, second] = DETAIL_SPELLINGS;

    for (from, to) in [(first, second), (second, first)] {
        if reference.contains(from) {
            let swapped = reference.replacen(from, to, 1);
            if !candidates.contains(&swapped) {
                candidates.push(swapped);
            }
        }
    }

    candidates
}

/// Fetches detail pages and runs the extraction chains over them.
#[derive(Clone)]
pub struct DetailResolver {
    client: UpstreamClient,
    login: LoginFlow,
    config: Arc<Config>,
    patterns: Arc<Patterns>,
}

impl DetailResolver {
    pub fn new(
        client: UpstreamClient,
        login: LoginFlow,
        config: Arc<Config>,
        patterns: Arc<Patterns>,
    ) -> Self {
        Self {
            client,
            login,
            config,
            patterns,
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, reference: &str) -> Result<StreamDescriptor> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ProxyError::Validation("detailUrl required".to_string()));
        }

        self.login.ensure_session().await?;

        let (resolved_from, html) = self.fetch_detail(reference).await?;
        let resolved_at = Utc::now();

        let thumbnail = first_match(THUMBNAIL_CHAIN, &self.patterns, &html)
            .and_then(|(stage, raw)| {
                debug!(stage, "Thumbnail found");
                normalize_image_url(self.config.origin(), &raw)
            });

        match first_match(STREAM_CHAIN, &self.patterns, &html) {
            Some((stage, stream_url)) => {
                info!(stage, %stream_url, "Stream resolved");
                Ok(StreamDescriptor {
                    stream_url,
                    thumbnail,
                    resolved_from,
                    resolved_at,
                })
            }
            None => {
                warn!(
                    detail_page = %resolved_from,
                    html_len = html.len(),
                    "No stream pattern matched"
                );
                Err(ProxyError::StreamNotFound {
                    thumbnail,
                    meta: resolve_meta(&resolved_from, resolved_at),
                })
            }
        }
    }

    /// GET each candidate until one answers 2xx.
    async fn fetch_detail(&self, reference: &str) -> Result<(String, String)> {
        let origin = self.config.origin();
        let tried: Vec<String> = candidate_urls(reference)
            .iter()
            .filter_map(|candidate| absolute_url(origin, candidate))
            .collect();

        let mut last_status = None;
        for url in &tried {
            let request = UpstreamRequest::get(url).header("Referer", format!("{origin}/"));
            match self.client.send(request).await {
                Ok(response) if response.is_success() => {
                    return Ok((url.clone(), response.body));
                }
                Ok(response) => {
                    debug!(%url, status = response.status, "Detail candidate rejected");
                    last_status = Some(response.status);
                }
                Err(e) if e.is_transport() => {
                    warn!(%url, error = %e, "Detail candidate unreachable");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProxyError::UpstreamFetch {
            status: last_status,
            tried,
        })
    }
}
