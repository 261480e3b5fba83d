//! Shared upstream session
//!
//! One [`Session`] is shared (via cheap clones) by every component that talks
//! to the upstream. The jar sits behind a write lock so cookie captures are
//! single-writer; a separate login gate serializes "log in if needed" so
//! concurrent callers that all see an empty jar trigger only one login.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::cookies::CookieJar;

/// Handle to the process-wide cookie session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    jar: Arc<RwLock<CookieJar>>,
    login_gate: Arc<Mutex<()>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one cookie is held.
    pub async fn is_authenticated(&self) -> bool {
        !self.jar.read().await.is_empty()
    }

    /// Current `Cookie` header value (empty when unauthenticated).
    pub async fn cookie_header(&self) -> String {
        self.jar.read().await.header_value()
    }

    /// Merge `Set-Cookie` values; returns how many cookies were applied.
    pub async fn absorb<S: AsRef<str>>(&self, set_cookies: &[S]) -> usize {
        if set_cookies.is_empty() {
            return 0;
        }
        self.jar.write().await.absorb(set_cookies)
    }

    /// Drop every cookie.
    pub async fn reset(&self) {
        self.jar.write().await.clear();
    }

    /// Cookie names currently held, for logging without leaking values.
    pub async fn cookie_names(&self) -> Vec<String> {
        self.jar.read().await.names().map(str::to_string).collect()
    }

    /// Acquire the login gate. Hold it across the check-then-login sequence.
    pub async fn login_gate(&self) -> MutexGuard<'_, ()> {
        self.login_gate.lock().await
    }
}
