//! Upstream HTTP client
//!
//! Every outbound request goes through [`UpstreamClient::send`], which:
//! - sets the fixed desktop-browser `User-Agent` (the portal rejects others)
//! - attaches the session `Cookie` header unless the caller supplied one
//! - captures every `Set-Cookie` on the response, whatever the status
//!
//! The wire itself sits behind the [`Transport`] trait. [`ReqwestTransport`]
//! keeps two clients because reqwest fixes the redirect policy per client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Method};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::session::Session;

/// Identity sent on every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Encode pairs as `application/x-www-form-urlencoded`, keeping their order.
pub fn encode_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Whether the transport follows redirects itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Follow up to 10 redirects and return the final response
    Auto,
    /// Return the 3xx response untouched
    Manual,
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub redirect: RedirectMode,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            redirect: RedirectMode::Auto,
        }
    }

    /// POST with an urlencoded body.
    pub fn post_form(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            headers: vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: Some(body),
            redirect: RedirectMode::Auto,
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn redirect(mut self, mode: RedirectMode) -> Self {
        self.redirect = mode;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn has_header(&self, name: &str) -> bool {
        self.header_value(name).is_some()
    }
}

/// Status, headers and decoded body of an upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Headers in wire order; repeated headers appear once per value
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl UpstreamResponse {
    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header (case-insensitive).
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location").filter(|l| !l.is_empty())
    }
}

/// Raw wire access.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request exactly as given.
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse>;
}

/// reqwest-backed transport with rustls, compression and pooled connections
pub struct ReqwestTransport {
    follow: Client,
    manual: Client,
}

impl ReqwestTransport {
    /// Build both the redirect-following and the manual-redirect clients.
    pub fn new() -> Result<Self> {
        Ok(Self {
            follow: Self::build(Policy::limited(10))?,
            manual: Self::build(Policy::none())?,
        })
    }

    fn build(policy: Policy) -> Result<Client> {
        let client = Client::builder()
            // Let the server negotiate HTTP/2
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            // no connect or total timeout; slow pages are waited for
            .redirect(policy)
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        let client = match request.redirect {
            RedirectMode::Auto => &self.follow,
            RedirectMode::Manual => &self.manual,
        };

        let mut builder = client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Session-aware client used by the authenticator, search and resolver.
#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<dyn Transport>,
    session: Session,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn Transport>, session: Session) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send a request with identity and session headers, then capture cookies.
    #[instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url, redirect = ?request.redirect)
    )]
    pub async fn send(&self, mut request: UpstreamRequest) -> Result<UpstreamResponse> {
        request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("user-agent"));
        request
            .headers
            .insert(0, ("User-Agent".to_string(), USER_AGENT.to_string()));

        if !request.has_header("cookie") {
            let cookie = self.session.cookie_header().await;
            if !cookie.is_empty() {
                request.headers.push(("Cookie".to_string(), cookie));
            }
        }

        debug!("Sending upstream request");
        let response = self.transport.execute(&request).await?;

        let captured = self.session.absorb(&response.header_all("set-cookie")).await;

        info!(
            status = response.status,
            cookies_captured = captured,
            body_len = response.body.len(),
            "Upstream response received"
        );

        Ok(response)
    }
}
