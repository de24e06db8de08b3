//! Typed failures for every Threads API operation.
//!
//! Each [`Error`] carries enough structure (its [`ErrorKind`], the offending field or HTTP
//! status, the remote message and the request correlation id) that callers can branch on it
//! without matching on display strings.

use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Arguments were rejected before any network call was made.
    Validation,
    /// The credential or token was rejected; the caller must re-authenticate.
    Authentication,
    /// The remote throttled the request.
    RateLimit,
    /// Any other remote or transport failure.
    Api,
    /// A local deadline elapsed.
    Timeout,
    /// The operation was cancelled or shut down.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("authentication failed{}: {message}", fmt_status(.status))]
    Authentication {
        status: Option<u16>,
        message: String,
        request_id: Option<String>,
    },

    #[error("rate limited (status 429){}: {message}", fmt_retry_after(.retry_after))]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
        request_id: Option<String>,
    },

    #[error("Threads API error{}: {message}", fmt_status(.status))]
    Api {
        status: Option<u16>,
        message: String,
        body: Option<String>,
        request_id: Option<String>,
    },

    /// Processing of a media container ended in `ERROR` or `EXPIRED`.
    #[error("container {id} ended in {status}: {}", fmt_detail(.detail))]
    ContainerFailed {
        id: String,
        status: crate::threads_api::ContainerStatus,
        detail: Option<String>,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The request never produced a response (connection refused, DNS, TLS, ...).
    #[error("could not reach the Threads API")]
    Connect(#[source] reqwest::Error),

    /// The request may have reached the server, but no complete response came back.
    ///
    /// Never retried: the server may already have acted on it.
    #[error("request to the Threads API was interrupted{}", fmt_status(.status))]
    Interrupted {
        /// Status line received before the failure, if any.
        status: Option<u16>,
        #[source]
        source: reqwest::Error,
    },

    #[error("decode {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("local callback server")]
    Io(#[from] std::io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

fn fmt_detail(detail: &Option<String>) -> &str {
    detail.as_deref().unwrap_or("no detail provided")
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            status: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Api { .. } | Self::ContainerFailed { .. } => ErrorKind::Api,
            Self::Connect(_) | Self::Interrupted { .. } | Self::Decode { .. } | Self::Io(_) => {
                ErrorKind::Api
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// The argument that failed validation, if this is a validation error.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// The HTTP status the remote answered with, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Api { status, .. }
            | Self::Interrupted { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Correlation id of the failed request, taken from the response headers or body.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Authentication { request_id, .. }
            | Self::RateLimit { request_id, .. }
            | Self::Api { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Rate limiting, server-side 5xx responses and requests that never reached the server are
    /// transient. Everything else, including local timeouts and interrupted responses, is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Api {
                status: Some(status),
                ..
            } => (500..=599).contains(status),
            Self::Connect(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn api(status: u16) -> Error {
        Error::Api {
            status: Some(status),
            message: "boom".to_string(),
            body: None,
            request_id: Some("A1b2".to_string()),
        }
    }

    #[test]
    fn validation_names_field() {
        let err = Error::validation("media_url", "must not be empty");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("media_url"));
        assert_eq!(err.to_string(), "invalid media_url: must not be empty");
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(api(500).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(404).is_transient());
    }

    #[test]
    fn rate_limit_exposes_status_and_retry_after() {
        let err = Error::RateLimit {
            retry_after: Some(Duration::from_secs(7)),
            message: "slow down".to_string(),
            request_id: None,
        };
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert!(err.is_transient());
        assert!(err.to_string().contains("retry after 7s"));
    }

    #[test]
    fn authentication_is_never_transient() {
        let err = Error::Authentication {
            status: Some(401),
            message: "expired".to_string(),
            request_id: Some("X".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.request_id(), Some("X"));
        assert!(!err.is_transient());
    }

    #[test]
    fn timeout_and_cancel_kinds() {
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(Error::Cancelled("x".into()).kind(), ErrorKind::Cancelled);
        assert!(!Error::Timeout("x".into()).is_transient());
    }
}
