//! Login handshake
//!
//! `Idle → SeedingSession → SubmittingCredentials → Authenticated | Failed`
//!
//! 1. Drop whatever session exists (never reuse stale cookies)
//! 2. GET the login page to seed a session cookie
//! 3. POST credentials with manual redirects, so the cookies on that exact
//!    response are captured before the redirect target is requested
//! 4. The upstream signals success through cookies, not the status code
//! 5. Follow `Location` once so the server can finalize the session

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::http_client::{encode_form, RedirectMode, UpstreamClient, UpstreamRequest};
use crate::urls::resolve_location;

/// Position in the login handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    SeedingSession,
    SubmittingCredentials,
    Authenticated { status: u16 },
    Failed(String),
}

/// Outcome of a successful login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Status of the credential POST
    pub status: u16,
    /// Cookie names held after the handshake
    pub cookies: Vec<String>,
    /// Redirect target that was followed, if any
    pub final_url: Option<String>,
}

/// Login flow orchestrator
#[derive(Clone)]
pub struct LoginFlow {
    client: UpstreamClient,
    config: Arc<Config>,
}

impl LoginFlow {
    pub fn new(client: UpstreamClient, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Log in unless a session already exists.
    ///
    /// Holds the session's login gate for the whole check-then-login
    /// sequence, so concurrent callers share one handshake.
    pub async fn ensure_session(&self) -> Result<()> {
        let session = self.client.session();
        let _gate = session.login_gate().await;
        if session.is_authenticated().await {
            return Ok(());
        }
        self.login().await.map(|_| ())
    }

    /// Run the handshake from scratch.
    ///
    /// Callers should check for an existing session first; this always
    /// discards it.
    #[instrument(skip(self), fields(login_url = %self.config.login_url))]
    pub async fn login(&self) -> Result<LoginResult> {
        let mut state = LoginState::Idle;
        let mut final_url = None;

        loop {
            debug!(?state, "login step");
            state = match state {
                LoginState::Idle => {
                    if self.config.has_login_config() {
                        self.client.session().reset().await;
                        LoginState::SeedingSession
                    } else {
                        LoginState::Failed("missing configuration".to_string())
                    }
                }
                LoginState::SeedingSession => {
                    self.seed_session().await?;
                    LoginState::SubmittingCredentials
                }
                LoginState::SubmittingCredentials => {
                    let (status, location) = self.submit_credentials().await?;
                    if self.client.session().is_authenticated().await {
                        if let Some(location) = location {
                            final_url = self.finalize(&location).await;
                        }
                        LoginState::Authenticated { status }
                    } else {
                        LoginState::Failed("upstream rejected credentials".to_string())
                    }
                }
                LoginState::Authenticated { status } => {
                    let cookies = self.client.session().cookie_names().await;
                    info!(status, cookies = ?cookies, "Login successful");
                    return Ok(LoginResult {
                        status,
                        cookies,
                        final_url,
                    });
                }
                LoginState::Failed(reason) => {
                    warn!(%reason, "Login failed");
                    return Err(ProxyError::Auth(reason));
                }
            };
        }
    }

    async fn seed_session(&self) -> Result<()> {
        let response = self
            .client
            .send(UpstreamRequest::get(self.config.login_page_url()))
            .await?;
        debug!(status = response.status, "Login page fetched");
        Ok(())
    }

    async fn submit_credentials(&self) -> Result<(u16, Option<String>)> {
        let body = encode_form(&[
            (self.config.login_id_field.as_str(), self.config.username.as_str()),
            (self.config.login_pw_field.as_str(), self.config.password.as_str()),
        ]);

        let request = UpstreamRequest::post_form(&self.config.login_url, body)
            .header("Origin", self.config.origin())
            .header("Referer", self.config.login_page_url())
            .redirect(RedirectMode::Manual);

        let response = self.client.send(request).await?;
        info!(status = response.status, "Credentials submitted");

        Ok((response.status, response.location().map(str::to_string)))
    }

    /// Follow the post-login redirect; failures only get logged.
    async fn finalize(&self, location: &str) -> Option<String> {
        let url = resolve_location(&self.config.login_url, location)?;
        match self.client.send(UpstreamRequest::get(&url)).await {
            Ok(response) => {
                debug!(status = response.status, %url, "Session finalized");
                Some(url)
            }
            Err(e) => {
                warn!(%url, error = %e, "Post-login redirect failed");
                None
            }
        }
    }
}
