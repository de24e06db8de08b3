//! Backoff policy and the mapping from HTTP responses to typed errors.
//!
//! Both halves are pure. [`RetryPolicy::delay_for`] computes the pause before a retry, and
//! [`classify`] turns a status line, headers and body into either success or a concrete
//! [`Error`].

use crate::error::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Graph error codes that mean the access token itself is unusable
/// (190: invalid or expired token, 102: session invalidated).
const AUTH_ERROR_CODES: [i64; 2] = [102, 190];

/// Response headers that may carry the request correlation id, in order of preference.
const REQUEST_ID_HEADERS: [&str; 2] = ["x-fb-trace-id", "x-fb-request-id"];

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a request is sent at most `max_retries + 1` times.
    pub max_retries: u32,
    #[serde(rename = "initial_delay_ms", with = "crate::config::duration_ms")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "crate::config::duration_ms")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends each request exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Pause before retry number `attempt` (0-indexed):
    /// `min(max_delay, initial_delay * backoff_factor^attempt)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Pause before retrying after `error`, honouring a server-provided retry-after hint but
    /// never waiting longer than `max_delay`.
    pub fn delay_after(&self, attempt: u32, error: &Error) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(self.max_delay),
            None => self.delay_for(attempt),
        }
    }
}

/// The `{"error": {...}}` envelope the Graph API wraps failures in.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_user_msg: Option<String>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

impl RemoteError {
    fn is_token_error(&self) -> bool {
        self.code.is_some_and(|code| AUTH_ERROR_CODES.contains(&code))
    }

    fn describe(&self) -> Option<String> {
        let message = self.error_user_msg.as_ref().or(self.message.as_ref())?;
        Some(match (&self.kind, self.code) {
            (Some(kind), Some(code)) => format!("{message} ({kind}, code {code})"),
            (None, Some(code)) => format!("{message} (code {code})"),
            (Some(kind), None) => format!("{message} ({kind})"),
            (None, None) => message.clone(),
        })
    }
}

/// Extracts the correlation id from the response headers.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| headers.get(*name)?.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps one HTTP response onto success or a typed error.
///
/// * 2xx without an embedded token error → `Ok(())`
/// * 401/403, or a body reporting Graph error code 102/190 → [`Error::Authentication`]
/// * 429 → [`Error::RateLimit`], with the `Retry-After` hint when present
/// * anything else → [`Error::Api`] carrying the raw body
///
/// Never produces [`Error::Validation`]; that kind is reserved for pre-flight checks.
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let remote = serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let request_id = request_id(headers).or_else(|| remote.as_ref()?.fbtrace_id.clone());
    let token_error = remote.as_ref().is_some_and(RemoteError::is_token_error);

    if status.is_success() && !token_error {
        return Ok(());
    }

    let message = remote
        .as_ref()
        .and_then(RemoteError::describe)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || token_error {
        return Err(Error::Authentication {
            status: Some(status.as_u16()),
            message,
            request_id,
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimit {
            retry_after: retry_after(headers),
            message,
            request_id,
        });
    }

    Err(Error::Api {
        status: Some(status.as_u16()),
        message,
        body: Some(String::from_utf8_lossy(body).into_owned()),
        request_id,
    })
}
