//! Restoring a stored session with `setup_client`.

mod common;

use common::*;
use jiff::{SignedDuration, Timestamp};
use pretty_assertions::assert_eq;
use std::time::Duration;
use threads_client::credentials::{CredentialStore, DEFAULT_ACCOUNT, InMemoryCredentialStore};
use threads_client::error::ErrorKind;
use threads_client::oauth::LoginOptions;
use threads_client::setup_client;
use threads_client::token::TokenBlob;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stored(token: &str, expires_in: SignedDuration) -> TokenBlob {
    TokenBlob {
        access_token: token.to_string(),
        user_id: USER_ID.to_string(),
        expires_at: Timestamp::now() + expires_in,
    }
}

/// Never opens a browser and gives up quickly, so a fallback to interactive login shows up as a
/// timeout.
fn headless() -> LoginOptions {
    LoginOptions {
        port: 0,
        deadline: Duration::from_millis(200),
        open_browser: false,
    }
}

async fn mount_profile(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": USER_ID})),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn restores_a_fresh_token_without_logging_in() {
    let server = MockServer::start().await;
    mount_profile(&server, "stored", 1).await;

    let store = InMemoryCredentialStore::new();
    let blob = stored("stored", SignedDuration::from_hours(24 * 30));
    store.set(DEFAULT_ACCOUNT, &blob).await.unwrap();

    let client = setup_client(&store, DEFAULT_ACCOUNT, credentials(), config(&server), headless())
        .await
        .unwrap();
    assert_eq!(client.tokens().current_token().await.unwrap().secret(), "stored");
    assert_eq!(store.get(DEFAULT_ACCOUNT).await.unwrap(), Some(blob));
}

#[tokio::test]
async fn refreshes_a_token_close_to_expiry_and_saves_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/refresh_access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "refreshed",
            "expires_in": 5_184_000
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_profile(&server, "refreshed", 1).await;

    let store = InMemoryCredentialStore::new();
    store
        .set("work", &stored("stored", SignedDuration::from_hours(48)))
        .await
        .unwrap();

    setup_client(&store, "work", credentials(), config(&server), headless())
        .await
        .unwrap();
    let saved = store.get("work").await.unwrap().unwrap();
    assert_eq!(saved.access_token, "refreshed");
    assert!(saved.expires_at > Timestamp::now() + SignedDuration::from_hours(24 * 59));
}

#[tokio::test]
async fn rejected_token_falls_back_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(graph_error(401, 190, "Session has expired"))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryCredentialStore::new();
    store
        .set(
            DEFAULT_ACCOUNT,
            &stored("revoked", SignedDuration::from_hours(24 * 30)),
        )
        .await
        .unwrap();

    let err = setup_client(&store, DEFAULT_ACCOUNT, credentials(), config(&server), headless())
        .await
        .unwrap_err();
    // nobody completes the login in time
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn expired_token_goes_straight_to_login() {
    let server = MockServer::start().await;
    mount_profile(&server, "expired", 0).await;

    let store = InMemoryCredentialStore::new();
    store
        .set(
            DEFAULT_ACCOUNT,
            &stored("expired", SignedDuration::from_hours(-1)),
        )
        .await
        .unwrap();

    let err = setup_client(&store, DEFAULT_ACCOUNT, credentials(), config(&server), headless())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(request_count(&server).await, 0);
}
