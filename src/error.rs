//! Error taxonomy for the session-and-extraction engine
//!
//! Extraction stages never produce errors; they fall through to the next
//! stage. Only an exhausted chain, a failed login or a failed fetch
//! surfaces here.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Diagnostic metadata about the detail page a resolution ran against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveMeta {
    /// Candidate URL that answered with a success status
    pub detail_page: String,
    /// RFC 3339 timestamp of the extraction
    pub extracted_at: String,
}

/// Errors reported by [`crate::NanuriProxy`] operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Bad caller input; never retried
    #[error("{0}")]
    Validation(String),

    /// Login could not establish a session
    #[error("login failed: {0}")]
    Auth(String),

    /// Every detail-page candidate failed at the status or transport level
    #[error("detail fetch failed (last status: {status:?})")]
    UpstreamFetch {
        status: Option<u16>,
        tried: Vec<String>,
    },

    /// Page was fetched but no stream pattern matched
    #[error("m3u8 not found on detail page")]
    StreamNotFound {
        thumbnail: Option<String>,
        meta: ResolveMeta,
    },

    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Network-level failure raised by a non-reqwest transport
    #[error("transport error: {0}")]
    TransportMessage(String),

    /// Configuration that cannot be turned into a working client
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// Status code an HTTP front-end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ProxyError::Validation(_) => 400,
            ProxyError::Auth(_) => 401,
            ProxyError::StreamNotFound { .. } => 404,
            ProxyError::UpstreamFetch { .. } => 502,
            ProxyError::Transport(_)
            | ProxyError::TransportMessage(_)
            | ProxyError::Config(_) => 500,
        }
    }

    /// True for network-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProxyError::Transport(_) | ProxyError::TransportMessage(_)
        )
    }

    /// JSON error body in the shape the front-end returns.
    pub fn to_payload(&self) -> Value {
        match self {
            ProxyError::Validation(msg) => json!({ "error": msg }),
            ProxyError::Auth(_) => json!({ "error": "login failed (check .env)" }),
            ProxyError::UpstreamFetch { status, tried } => json!({
                "error": "nanuri detail fetch failed",
                "status": status.unwrap_or(0),
                "tried": tried,
            }),
            ProxyError::StreamNotFound { thumbnail, meta } => json!({
                "error": self.to_string(),
                "thumbnail": thumbnail,
                "meta": meta,
            }),
            ProxyError::Transport(_)
            | ProxyError::TransportMessage(_)
            | ProxyError::Config(_) => json!({
                "error": "server error",
                "detail": self.to_string(),
            }),
        }
    }
}
