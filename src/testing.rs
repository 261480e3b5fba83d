//! Scripted transport for unit tests
//!
//! Replies are consumed in order; every executed request is recorded so
//! tests can assert on call counts, headers and bodies.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ProxyError, Result};
use crate::http_client::{Transport, UpstreamRequest, UpstreamResponse};

/// One canned upstream reply.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Response(UpstreamResponse),
    Fail(String),
}

impl Reply {
    pub(crate) fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        Reply::Response(UpstreamResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    pub(crate) fn redirect(location: &str) -> Self {
        Self::status(302, "").header("Location", location)
    }

    pub(crate) fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }

    pub(crate) fn cookie(self, set_cookie: &str) -> Self {
        self.header("Set-Cookie", set_cookie)
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Response(ref mut response) = self {
            response.headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests executed so far.
    pub(crate) fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        self.requests.lock().unwrap().push(request.clone());
        // let other tasks interleave like a real network call would
        tokio::task::yield_now().await;

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(ProxyError::TransportMessage(message)),
            None => Err(ProxyError::TransportMessage(format!(
                "no scripted reply for {}",
                request.url
            ))),
        }
    }
}

/// Minimal search result markup with one `fn_detail` anchor per reference.
pub(crate) fn result_page(items: &[(&str, &str)]) -> String {
    let mut html = String::from("<html><body><ul class=\"result_list\">");
    for (title, reference) in items {
        html.push_str(&format!(
            "<li><a href=\"#\" onclick=\"fn_detail('{reference}'); return false;\">{title}</a></li>"
        ));
    }
    html.push_str("</ul></body></html>");
    html
}
