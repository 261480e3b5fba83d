//! Upstream configuration
//!
//! Resolution order: built-in defaults, then `~/.config/nanuri-proxy/config.toml`,
//! then environment variables.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_ORIGIN: &str = "https://nanuri.ktv.go.kr";
const DEFAULT_STREAM_HOST: &str = "https://play.g.ktv.go.kr:4433";
const DEFAULT_IMAGE_HOST: &str = "nps.ktv.go.kr";
const DEFAULT_LOGIN_URL: &str = "https://nanuri.ktv.go.kr/member/doLogin.do";

/// Connection and credential settings for the upstream portal.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content origin, e.g. `https://nanuri.ktv.go.kr`
    pub origin: String,
    /// Streaming host (scheme, host and port) serving the HLS playlists
    pub stream_host: String,
    /// Host name of the catalog image server
    pub image_host: String,
    /// Credential POST endpoint
    pub login_url: String,
    pub login_id_field: String,
    pub login_pw_field: String,
    pub username: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            stream_host: DEFAULT_STREAM_HOST.to_string(),
            image_host: DEFAULT_IMAGE_HOST.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            login_id_field: "userId".to_string(),
            login_pw_field: "password".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("origin", &self.origin)
            .field("stream_host", &self.stream_host)
            .field("image_host", &self.image_host)
            .field("login_url", &self.login_url)
            .field("login_id_field", &self.login_id_field)
            .field("login_pw_field", &self.login_pw_field)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

impl Config {
    /// Load defaults, the optional config file, and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(&config_path())?;
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file, falling back to defaults when it is absent.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Override fields from variables returned by `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let bindings: [(&str, &mut String); 8] = [
            ("NANURI_ORIGIN", &mut self.origin),
            ("NANURI_STREAM_HOST", &mut self.stream_host),
            ("NANURI_IMAGE_HOST", &mut self.image_host),
            ("LOGIN_URL", &mut self.login_url),
            ("LOGIN_ID_FIELD", &mut self.login_id_field),
            ("LOGIN_PW_FIELD", &mut self.login_pw_field),
            ("NANURI_ID", &mut self.username),
            ("NANURI_PW", &mut self.password),
        ];

        for (key, slot) in bindings {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Origin without a trailing slash.
    pub fn origin(&self) -> &str {
        self.origin.trim_end_matches('/')
    }

    pub fn stream_host(&self) -> &str {
        self.stream_host.trim_end_matches('/')
    }

    pub fn search_url(&self) -> String {
        format!("{}/search/searchResultMain.do", self.origin())
    }

    pub fn login_page_url(&self) -> String {
        format!("{}/member/login.do", self.origin())
    }

    /// True when login URL, username and password are all present.
    pub fn has_login_config(&self) -> bool {
        !self.login_url.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Return the path to the config file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nanuri-proxy")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_nanuri() {
        let config = Config::default();
        assert_eq!(config.search_url(), "https://nanuri.ktv.go.kr/search/searchResultMain.do");
        assert_eq!(config.login_page_url(), "https://nanuri.ktv.go.kr/member/login.do");
        assert!(!config.has_login_config());
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let toml_str = r#"
username = "alice"
password = "pw"
origin = "https://mirror.example/"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.origin(), "https://mirror.example");
        assert_eq!(config.login_id_field, "userId");
        assert!(config.has_login_config());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str(r#"username = "from-file""#).unwrap();
        let env = HashMap::from([
            ("NANURI_ID", "from-env".to_string()),
            ("NANURI_PW", String::new()),
            ("LOGIN_ID_FIELD", "memberId".to_string()),
        ]);
        config.apply_env_with(|key| env.get(key).cloned());

        assert_eq!(config.username, "from-env");
        assert_eq!(config.login_id_field, "memberId");
        // empty values do not clobber
        assert!(config.password.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::from_file(std::path::Path::new("/nonexistent/nanuri.toml")).unwrap();
        assert_eq!(config.origin(), DEFAULT_ORIGIN);
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = Config {
            password: "hunter2".into(),
            ..Config::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
