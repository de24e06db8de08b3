//! Shared fixtures for the integration tests: a client pointed at a mock Graph API.

#![allow(dead_code)]

use jiff::{SignedDuration, Timestamp};
use oauth2::AccessToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use threads_client::config::{ClientConfig, Credentials};
use threads_client::retry::RetryPolicy;
use threads_client::threads_api::{PollOptions, ThreadsClient};
use wiremock::{MockServer, Respond, ResponseTemplate};

pub const USER_ID: &str = "42";
pub const TOKEN: &str = "test-access-token";

/// Same shape as the default policy, but in milliseconds.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_factor: 2.0,
    }
}

pub fn fast_poll(max_attempts: u32) -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(5),
        max_attempts,
    }
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_base_url(server.uri())
        .with_retry(fast_retry())
        .with_poll(fast_poll(10))
}

pub fn credentials() -> Credentials {
    Credentials::new("app-id", "app-secret")
}

/// A client without any token.
pub fn client(server: &MockServer) -> ThreadsClient {
    ThreadsClient::new(credentials(), config(server)).unwrap()
}

/// A client holding [`TOKEN`] for [`USER_ID`], valid for a day.
pub async fn logged_in(server: &MockServer) -> ThreadsClient {
    let client = client(server);
    client
        .tokens()
        .set_token(
            AccessToken::new(TOKEN.to_string()),
            USER_ID.to_string(),
            Timestamp::now() + SignedDuration::from_hours(24),
        )
        .await;
    client
}

/// Answers with each template in turn, repeating the last one once the list runs out.
pub fn in_sequence(responses: Vec<ResponseTemplate>) -> impl Respond {
    assert!(!responses.is_empty());
    let next = AtomicUsize::new(0);
    move |_: &wiremock::Request| {
        let i = next.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
        responses[i].clone()
    }
}

pub fn graph_error(status: u16, code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "error": {
            "message": message,
            "type": "OAuthException",
            "code": code,
            "fbtrace_id": "TRACE-FROM-BODY"
        }
    }))
}

pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}
