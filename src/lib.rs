//! `nanuri-proxy` - session and extraction engine for the KTV nanuri portal
//!
//! # Features
//!
//! - **Session handling**: cookie jar with `Set-Cookie` capture on every response
//! - **Login**: seed, submit and finalize handshake, single-flight across callers
//! - **Search**: paginated catalog search with cross-page deduplication
//! - **Resolution**: detail page to HLS playlist through ordered extraction stages
//!
//! # Example
//!
//! ```rust,no_run
//! use nanuri_proxy::{Config, NanuriProxy, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let proxy = NanuriProxy::new(Config::load()?)?;
//!     let outcome = proxy.search(&SearchQuery::new("briefing")).await?;
//!     if let Some(first) = outcome.items.first() {
//!         let stream = proxy.resolve_stream(&first.detail_reference).await?;
//!         println!("{}", stream.stream_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod login;
pub mod proxy;
pub mod resolve;
pub mod search;
pub mod session;
pub mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use cookies::CookieJar;
pub use error::{ProxyError, ResolveMeta, Result};
pub use http_client::{
    ReqwestTransport, Transport, UpstreamClient, UpstreamRequest, UpstreamResponse,
};
pub use login::{LoginFlow, LoginResult, LoginState};
pub use proxy::{AuthStatus, ConfiguredCredentials, NanuriProxy};
pub use resolve::{candidate_urls, DetailResolver, StreamDescriptor};
pub use search::{SearchOutcome, SearchPaginator, SearchQuery, SearchRecord};
pub use session::Session;

/// Version of nanuri-proxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
