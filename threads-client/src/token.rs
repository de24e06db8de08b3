//! Ownership of the access token and the OAuth exchanges that produce it.
//!
//! [`TokenManager`] is the single source of truth for the token a client sends. Reads take a
//! shared lock; writes take the exclusive lock only long enough to swap in a fully built
//! [`TokenState`]. Network round trips always happen before the lock is taken, so a slow token
//! endpoint never blocks readers.

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::threads_api::types::string_or_number;
use crate::transport::{RequestSpec, Transport};
use jiff::{SignedDuration, Timestamp};
use oauth2::{AccessToken, AuthorizationCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Lifetime assumed for a short-lived token when the exchange does not report one.
const SHORT_LIVED_LIFETIME: SignedDuration = SignedDuration::from_hours(1);

/// Lifetime assumed for a long-lived token when the exchange does not report one.
const LONG_LIVED_LIFETIME: SignedDuration = SignedDuration::from_hours(24 * 60);

/// The token currently in use, replaced as a whole on every write.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: AccessToken,
    pub user_id: String,
    pub expires_at: Timestamp,
}

impl TokenState {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Serializable form, for handing to a credential store.
    pub fn to_blob(&self) -> TokenBlob {
        TokenBlob {
            access_token: self.access_token.secret().clone(),
            user_id: self.user_id.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// What a credential store persists per account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBlob {
    pub access_token: String,
    pub user_id: String,
    pub expires_at: Timestamp,
}

impl std::fmt::Debug for TokenBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBlob")
            .field("access_token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<TokenBlob> for TokenState {
    fn from(blob: TokenBlob) -> Self {
        Self {
            access_token: AccessToken::new(blob.access_token),
            user_id: blob.user_id,
            expires_at: blob.expires_at,
        }
    }
}

/// Response of `POST /oauth/access_token`.
#[derive(Deserialize)]
struct CodeExchangeResponse {
    access_token: String,
    #[serde(deserialize_with = "string_or_number")]
    user_id: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Response of the long-lived exchange and refresh endpoints.
#[derive(Deserialize)]
struct LongLivedResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// How a new [`TokenState`] relates to the current one.
#[derive(Debug, Clone)]
enum Install {
    /// Explicit (re-)authentication: replace everything, expiry included.
    Replace,
    /// Upgrade or refresh of the grant that issued `from`: the expiry may only move forward,
    /// and the write is dropped if `from` is no longer the current token.
    Extend { from: AccessToken },
}

/// Holds the access token and drives its acquisition and renewal.
#[derive(Debug)]
pub struct TokenManager {
    credentials: Credentials,
    transport: Transport,
    state: RwLock<Option<TokenState>>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, transport: Transport) -> Self {
        Self {
            credentials,
            transport,
            state: RwLock::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The current access token.
    ///
    /// Fails with an authentication error when no token has been obtained yet.
    pub async fn current_token(&self) -> Result<AccessToken> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|state| state.access_token.clone())
            .ok_or_else(|| Error::authentication("not logged in: no access token available"))
    }

    /// Id of the user the current token belongs to.
    pub async fn user_id(&self) -> Result<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|state| state.user_id.clone())
            .ok_or_else(|| Error::authentication("not logged in: no user id available"))
    }

    /// A copy of the whole token state, if any.
    pub async fn snapshot(&self) -> Option<TokenState> {
        self.state.read().await.clone()
    }

    /// Whether the token is missing or expires within `window` of `now`.
    pub async fn needs_refresh(&self, window: SignedDuration, now: Timestamp) -> bool {
        match self.state.read().await.as_ref() {
            None => true,
            Some(state) => state.expires_at.checked_sub(window).unwrap_or(Timestamp::MIN) <= now,
        }
    }

    /// Injects a token obtained elsewhere, replacing any current state wholesale.
    ///
    /// This counts as explicit re-authentication: the expiry may move backwards.
    pub async fn set_token(&self, token: AccessToken, user_id: String, expires_at: Timestamp) {
        self.install(
            TokenState {
                access_token: token,
                user_id,
                expires_at,
            },
            Install::Replace,
        )
        .await;
    }

    /// Reinstates a token previously saved with [`TokenState::to_blob`].
    pub async fn restore(&self, blob: TokenBlob) {
        self.install(blob.into(), Install::Replace).await;
    }

    /// Forgets the current token.
    pub async fn clear(&self) {
        *self.state.write().await = None;
    }

    /// Swaps in `new`. Returns `false` when a renewal was dropped as stale.
    async fn install(&self, new: TokenState, mode: Install) -> bool {
        let mut state = self.state.write().await;
        let new = match (mode, state.as_ref()) {
            (Install::Replace, _) => new,
            (Install::Extend { from }, Some(current))
                if current.access_token.secret() == from.secret() =>
            {
                if new.expires_at < current.expires_at {
                    tracing::debug!(
                        "renewed token reports an earlier expiry, keeping the later one"
                    );
                    TokenState {
                        expires_at: current.expires_at,
                        ..new
                    }
                } else {
                    new
                }
            }
            (Install::Extend { .. }, _) => {
                tracing::debug!("token changed while renewing, discarding the renewed token");
                return false;
            }
        };
        *state = Some(new);
        true
    }

    /// Trades a one-time authorization code for a short-lived token.
    ///
    /// `redirect_uri` must be the same value that was embedded in the authorization URL.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &AuthorizationCode,
        redirect_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        crate::validation::require_non_blank("code", code.secret())?;
        let spec = RequestSpec::post("/oauth/access_token").form(vec![
            ("client_id".into(), self.credentials.client_id.to_string()),
            (
                "client_secret".into(),
                self.credentials.client_secret.secret().clone(),
            ),
            ("grant_type".into(), "authorization_code".into()),
            ("redirect_uri".into(), redirect_uri.to_string()),
            ("code".into(), code.secret().clone()),
        ]);

        let response = self
            .transport
            .execute(spec, None, cancel)
            .await
            .map_err(rejected_as_authentication)?;
        let exchanged: CodeExchangeResponse = response.json("authorization code exchange")?;

        let lifetime = exchanged
            .expires_in
            .map(SignedDuration::from_secs)
            .unwrap_or(SHORT_LIVED_LIFETIME);
        tracing::debug!(user_id = %exchanged.user_id, "exchanged authorization code");
        self.install(
            TokenState {
                access_token: AccessToken::new(exchanged.access_token),
                user_id: exchanged.user_id,
                expires_at: expiry_after(lifetime),
            },
            Install::Replace,
        )
        .await;
        Ok(())
    }

    /// Exchanges the current short-lived token for a long-lived one.
    ///
    /// Callers treat failure as non-fatal: the existing token stays in place and keeps working
    /// until it expires.
    #[instrument(skip_all)]
    pub async fn upgrade_to_long_lived(&self, cancel: &CancellationToken) -> Result<()> {
        let current = self.current_token().await?;
        let spec = RequestSpec::get("/access_token")
            .query("grant_type", "th_exchange_token")
            .query("client_secret", self.credentials.client_secret.secret())
            .query("access_token", current.secret());
        self.renew(current, spec, "long-lived token exchange", cancel).await
    }

    /// Extends an unexpired long-lived token.
    #[instrument(skip_all)]
    pub async fn refresh_long_lived(&self, cancel: &CancellationToken) -> Result<()> {
        let current = self.current_token().await?;
        let spec = RequestSpec::get("/refresh_access_token")
            .query("grant_type", "th_refresh_token")
            .query("access_token", current.secret());
        self.renew(current, spec, "long-lived token refresh", cancel).await
    }

    /// Runs a renewal of `from` and installs the result, unless `from` was replaced meanwhile.
    async fn renew(
        &self,
        from: AccessToken,
        spec: RequestSpec,
        what: &'static str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let user_id = self.user_id().await?;
        let response = self
            .transport
            .execute(spec, None, cancel)
            .await
            .map_err(rejected_as_authentication)?;
        let renewed: LongLivedResponse = response.json(what)?;
        let lifetime = renewed
            .expires_in
            .map(SignedDuration::from_secs)
            .unwrap_or(LONG_LIVED_LIFETIME);
        let expires_at = expiry_after(lifetime);
        let installed = self
            .install(
                TokenState {
                    access_token: AccessToken::new(renewed.access_token),
                    user_id,
                    expires_at,
                },
                Install::Extend { from },
            )
            .await;
        if installed {
            tracing::debug!(%expires_at, "{what} succeeded");
        }
        Ok(())
    }
}

fn expiry_after(lifetime: SignedDuration) -> Timestamp {
    Timestamp::now()
        .checked_add(lifetime)
        .unwrap_or(Timestamp::MAX)
}

/// Token endpoints answer a bad code or token with a plain 4xx; surface those as
/// authentication failures so callers know to re-authenticate.
fn rejected_as_authentication(error: Error) -> Error {
    match error {
        Error::Api {
            status: Some(status),
            message,
            request_id,
            ..
        } if (400..500).contains(&status) => Error::Authentication {
            status: Some(status),
            message,
            request_id,
        },
        other => other,
    }
}
