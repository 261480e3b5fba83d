//! Facade tying session, login, search and resolution together

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::extract::Patterns;
use crate::http_client::{ReqwestTransport, Transport, UpstreamClient};
use crate::login::LoginFlow;
use crate::resolve::{DetailResolver, StreamDescriptor};
use crate::search::{SearchOutcome, SearchPaginator, SearchQuery};
use crate::session::Session;

/// Which login settings are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfiguredCredentials {
    #[serde(rename = "NANURI_ID")]
    pub username: bool,
    #[serde(rename = "NANURI_PW")]
    pub password: bool,
    #[serde(rename = "LOGIN_URL")]
    pub login_url: bool,
}

/// Session probe; never triggers a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub logged_in: bool,
    pub has_env: ConfiguredCredentials,
}

/// Entry point for callers.
///
/// Clones share one session, so a login performed through any clone is
/// visible to all of them.
#[derive(Clone)]
pub struct NanuriProxy {
    config: Arc<Config>,
    session: Session,
    login: LoginFlow,
    search: SearchPaginator,
    resolver: DetailResolver,
}

impl NanuriProxy {
    /// Build a proxy talking to the network through reqwest.
    pub fn new(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a proxy over any transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let patterns = Patterns::new(&config).map_err(|e| ProxyError::Config(e.to_string()))?;
        let patterns = Arc::new(patterns);
        let config = Arc::new(config);
        let session = Session::new();
        let client = UpstreamClient::new(transport, session.clone());
        let login = LoginFlow::new(client.clone(), config.clone());

        info!(
            origin = config.origin(),
            has_login = config.has_login_config(),
            "Proxy initialized"
        );

        Ok(Self {
            search: SearchPaginator::new(
                client.clone(),
                login.clone(),
                config.clone(),
                patterns.clone(),
            ),
            resolver: DetailResolver::new(client, login.clone(), config.clone(), patterns),
            config,
            session,
            login,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Log in unless a session already exists.
    pub async fn ensure_session(&self) -> Result<()> {
        self.login.ensure_session().await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        self.search.search(query).await
    }

    /// Resolve a detail reference from a search record to its stream.
    pub async fn resolve_stream(&self, detail_reference: &str) -> Result<StreamDescriptor> {
        self.resolver.resolve(detail_reference).await
    }

    pub async fn auth_status(&self) -> AuthStatus {
        AuthStatus {
            logged_in: self.session.is_authenticated().await,
            has_env: ConfiguredCredentials {
                username: !self.config.username.is_empty(),
                password: !self.config.password.is_empty(),
                login_url: !self.config.login_url.is_empty(),
            },
        }
    }
}
