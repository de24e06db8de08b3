//! Where access tokens are kept between runs.
//!
//! Only the interface and an in-memory store live here; durable backends (keychain, encrypted
//! files, ...) implement [`CredentialStore`] outside this crate.

use crate::error::Result;
use crate::token::TokenBlob;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Account name used when the caller does not manage several.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Storage for tokens, keyed by account name.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the token saved for `account`, if any.
    async fn get(&self, account: &str) -> Result<Option<TokenBlob>>;
    /// Saves (or overwrites) the token for `account`.
    async fn set(&self, account: &str, blob: &TokenBlob) -> Result<()>;
    /// Removes the token for `account`. Removing a missing account is not an error.
    async fn delete(&self, account: &str) -> Result<()>;
}

/// A [`CredentialStore`] that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    data: Mutex<HashMap<String, TokenBlob>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, account: &str) -> Result<Option<TokenBlob>> {
        Ok(self.data.lock().await.get(account).cloned())
    }

    async fn set(&self, account: &str, blob: &TokenBlob) -> Result<()> {
        self.data
            .lock()
            .await
            .insert(account.to_string(), blob.clone());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<()> {
        self.data.lock().await.remove(account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blob(token: &str) -> TokenBlob {
        TokenBlob {
            access_token: token.to_string(),
            user_id: "42".to_string(),
            expires_at: "2030-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    async fn exercise(store: &dyn CredentialStore) {
        assert_eq!(store.get(DEFAULT_ACCOUNT).await.unwrap(), None);
        store.set(DEFAULT_ACCOUNT, &blob("one")).await.unwrap();
        store.set("work", &blob("two")).await.unwrap();
        assert_eq!(store.get(DEFAULT_ACCOUNT).await.unwrap(), Some(blob("one")));

        store.set(DEFAULT_ACCOUNT, &blob("three")).await.unwrap();
        assert_eq!(
            store.get(DEFAULT_ACCOUNT).await.unwrap(),
            Some(blob("three"))
        );

        store.delete(DEFAULT_ACCOUNT).await.unwrap();
        store.delete("never-stored").await.unwrap();
        assert_eq!(store.get(DEFAULT_ACCOUNT).await.unwrap(), None);
        assert_eq!(store.get("work").await.unwrap(), Some(blob("two")));
    }

    #[tokio::test]
    async fn in_memory_store() {
        exercise(&InMemoryCredentialStore::new()).await;
    }
}
