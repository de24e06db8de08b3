//! Sends one request with bounded, sequential retries and classifies the outcome.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::retry::{self, RetryPolicy};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use oauth2::AccessToken;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Payload of a request.
#[derive(Clone, PartialEq)]
pub enum Body {
    /// `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

// Form bodies carry client secrets and authorization codes, so only field names are shown.
impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Form(fields) => f
                .debug_tuple("Form")
                .field(&fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
                .finish(),
            Self::Json(_) => f.write_str("Json(..)"),
        }
    }
}

/// Query parameters whose values never appear in `Debug` output.
const SECRET_PARAMS: [&str; 3] = ["access_token", "client_secret", "code"];

/// Everything needed to send one request. Built per call and consumed by [`Transport::execute`].
#[derive(Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path below the base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Overrides the client-wide request timeout.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let query: Vec<_> = self
            .query
            .iter()
            .map(|(k, v)| {
                if SECRET_PARAMS.contains(&k.as_str()) {
                    (k.as_str(), "[redacted]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &query)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a query parameter only when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(Body::Form(fields));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful (2xx) response, fully read.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn json<T: DeserializeOwned>(&self, what: &'static str) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|source| Error::Decode { what, source })
    }

    pub fn request_id(&self) -> Option<String> {
        retry::request_id(&self.headers)
    }
}

/// The HTTP layer shared by every component of a client.
///
/// Holds no token state; callers pass the bearer credential for each request.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(Error::Connect)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy: config.retry,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `spec`, retrying transient failures.
    ///
    /// At most `max_retries + 1` attempts are made, one after another. When the budget runs out
    /// the last concrete error is returned. Non-transient failures return immediately.
    #[instrument(skip_all, fields(method = %spec.method, path = %spec.path))]
    pub async fn execute(
        &self,
        spec: RequestSpec,
        bearer: Option<&AccessToken>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("{} {}", spec.method, spec.path)));
                }
                result = self.send_once(&spec, bearer) => result,
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => e,
                Err(e) => {
                    if attempt > 0 {
                        tracing::warn!(attempts = attempt + 1, error = %e, "giving up on request");
                    }
                    return Err(e);
                }
            };

            let delay = self.policy.delay_after(attempt, &error);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!(
                        "{} {} while backing off",
                        spec.method, spec.path
                    )));
                }
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        spec: &RequestSpec,
        bearer: Option<&AccessToken>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut request = self.http.request(spec.method.clone(), &url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token.secret());
        }
        match &spec.body {
            Some(Body::Form(fields)) => request = request.form(fields),
            Some(Body::Json(value)) => request = request.json(value),
            None => {}
        }
        if let Some(timeout) = spec.timeout {
            request = request.timeout(timeout);
        }

        // query strings can carry client secrets and tokens
        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                Error::Timeout(format!("{} {}", spec.method, spec.path))
            } else if e.is_connect() {
                Error::Connect(e)
            } else {
                Error::Interrupted {
                    status: None,
                    source: e,
                }
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                Error::Timeout(format!("reading {} {}", spec.method, spec.path))
            } else {
                Error::Interrupted {
                    status: Some(status.as_u16()),
                    source: e,
                }
            }
        })?;

        retry::classify(status, &headers, &body)?;
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
