use crate::config::{ClientConfig, Credentials};
use crate::credentials::CredentialStore;
use crate::error::ErrorKind;
use crate::oauth::LoginOptions;
use crate::threads_api::ThreadsClient;
use jiff::{SignedDuration, Timestamp};

pub mod config;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod retry;
pub mod threads_api;
pub mod token;
pub mod transport;
pub mod validation;

pub use error::{Error, Result};

/// Stored long-lived tokens this close to expiry are refreshed on startup.
pub const REFRESH_WINDOW: SignedDuration = SignedDuration::from_hours(24 * 7);

/// Complete token setup for a long-running client.
///
/// Restores the token saved for `account`, refreshing it when it is close to expiry, and checks
/// that it still works. When there is no usable token the interactive login flow runs. Either
/// way the resulting token is written back to `store`.
pub async fn setup_client(
    store: &dyn CredentialStore,
    account: &str,
    credentials: Credentials,
    config: ClientConfig,
    login: LoginOptions,
) -> Result<ThreadsClient> {
    let client = ThreadsClient::new(credentials, config)?;
    let tokens = client.tokens();
    let cancel = client.cancellation_token().clone();

    // ==============================================================================
    // Token Restoration
    // ==============================================================================
    // A stored token is only worth keeping if it has not expired yet; expired Threads
    // tokens cannot be refreshed, so those go straight to a new login.
    let mut usable = false;
    if let Some(blob) = store.get(account).await? {
        if blob.expires_at <= Timestamp::now() {
            tracing::info!(account, expired_at = %blob.expires_at, "stored token has expired");
        } else {
            tokens.restore(blob).await;
            usable = true;
        }
    }

    // ==============================================================================
    // Proactive Refresh
    // ==============================================================================
    if usable && tokens.needs_refresh(REFRESH_WINDOW, Timestamp::now()).await {
        tracing::info!(account, "refreshing stored token close to expiry");
        match tokens.refresh_long_lived(&cancel).await {
            Ok(()) => tracing::debug!("refreshed stored token"),
            Err(e) if e.kind() == ErrorKind::Authentication => {
                tracing::warn!(error = %e, "stored token was rejected, logging in again");
                usable = false;
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => return Err(e),
            Err(e) => tracing::warn!(error = %e, "token refresh failed, keeping current token"),
        }
    }

    // ==============================================================================
    // Token Validation
    // ==============================================================================
    if usable {
        match client.get_me().await {
            Ok(user) => tracing::info!(account, user_id = %user.id, "restored Threads session"),
            Err(e) if e.kind() == ErrorKind::Authentication => {
                tracing::warn!(error = %e, "stored token failed validation, logging in again");
                usable = false;
            }
            Err(e) => return Err(e),
        }
    }

    if !usable {
        tokens.clear().await;
        oauth::login(&client, login).await?;
    }

    if let Some(state) = tokens.snapshot().await {
        store.set(account, &state.to_blob()).await?;
    }
    Ok(client)
}
