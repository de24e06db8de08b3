//! Application credentials and client tuning.

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::threads_api::PollOptions;
use oauth2::{ClientId, ClientSecret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://graph.threads.net";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";
pub const DEFAULT_API_VERSION: &str = "v1.0";

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: [&str; 2] = ["threads_basic", "threads_content_publish"];

/// The registered application's OAuth credentials.
///
/// Fixed for the lifetime of a client. The secret is wrapped so that it never shows up in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    /// Where the authorization server sends the browser back to. When unset, the login flow
    /// uses the address of its local callback listener.
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            redirect_uri: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Reads `THREADS_CLIENT_ID`, `THREADS_CLIENT_SECRET`, and optionally
    /// `THREADS_REDIRECT_URI` and `THREADS_SCOPES` (comma-separated).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str, field: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::validation(field, format!("{key} is not set")))
        };
        let mut credentials = Self::new(
            required("THREADS_CLIENT_ID", "client_id")?,
            required("THREADS_CLIENT_SECRET", "client_secret")?,
        );
        if let Some(redirect_uri) = lookup("THREADS_REDIRECT_URI").filter(|v| !v.is_empty()) {
            crate::validation::require_url("redirect_uri", &redirect_uri)?;
            credentials.redirect_uri = Some(redirect_uri);
        }
        if let Some(scopes) = lookup("THREADS_SCOPES") {
            let scopes: Vec<_> = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if !scopes.is_empty() {
                credentials = credentials.with_scopes(scopes);
            }
        }
        Ok(credentials)
    }
}

/// Where to send requests and how hard to try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host of the Graph API, without a trailing slash.
    pub base_url: String,
    pub authorize_url: String,
    /// Version segment prefixed to every API path, e.g. `v1.0`.
    pub api_version: String,
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub poll: PollOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
            poll: PollOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, overlaid with `THREADS_API_BASE_URL` and `THREADS_API_VERSION` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("THREADS_API_BASE_URL") {
            crate::validation::require_url("base_url", &base_url)?;
            config.base_url = base_url;
        }
        if let Ok(version) = std::env::var("THREADS_API_VERSION") {
            crate::validation::require_id("api_version", &version)?;
            config.api_version = version;
        }
        Ok(config)
    }

    /// Points the client at another host, e.g. a mock server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// `/{api_version}/{path}`, ready to be joined onto the base URL.
    pub(crate) fn versioned(&self, path: &str) -> String {
        format!("/{}/{}", self.api_version, path.trim_start_matches('/'))
    }
}

/// (De)serializes a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn credentials_require_id_and_secret() {
        let err = Credentials::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.field(), Some("client_id"));
        let err = Credentials::from_lookup(lookup(&[("THREADS_CLIENT_ID", "123")])).unwrap_err();
        assert_eq!(err.field(), Some("client_secret"));
    }

    #[test]
    fn credentials_from_env_values() {
        let credentials = Credentials::from_lookup(lookup(&[
            ("THREADS_CLIENT_ID", "123"),
            ("THREADS_CLIENT_SECRET", "shh"),
            ("THREADS_REDIRECT_URI", "https://localhost:8443/callback"),
            ("THREADS_SCOPES", "threads_basic, threads_read_replies,"),
        ]))
        .unwrap();
        assert_eq!(credentials.client_id.as_str(), "123");
        assert_eq!(credentials.client_secret.secret(), "shh");
        assert_eq!(
            credentials.redirect_uri.as_deref(),
            Some("https://localhost:8443/callback")
        );
        assert_eq!(
            credentials.scopes,
            vec!["threads_basic".to_string(), "threads_read_replies".to_string()]
        );
    }

    #[test]
    fn secret_is_not_debug_printed() {
        let credentials = Credentials::new("id", "super-secret-value");
        assert!(!format!("{credentials:?}").contains("super-secret-value"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_version":"v2.0","retry":{"max_retries":5,"initial_delay_ms":100}}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_version, "v2.0");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, RetryPolicy::default().max_delay);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn versioned_paths() {
        let config = ClientConfig::default();
        assert_eq!(config.versioned("me"), "/v1.0/me");
        assert_eq!(config.versioned("/123/threads"), "/v1.0/123/threads");
    }
}
