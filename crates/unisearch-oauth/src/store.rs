//! Credential storage boundary.
//!
//! Token persistence is owned by the embedding application (keychain,
//! encrypted file, remote vault). Connectors only need read/update access
//! keyed by an opaque account id, so the boundary is a small trait with an
//! in-memory implementation for tests and short-lived embedders.

use crate::error::Result;
use crate::token::Token;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read/update access to per-account token material.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the stored token for an account, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn load(&self, account_id: &str) -> Result<Option<Token>>;

    /// Stores or replaces the token for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn save(&self, account_id: &str, token: Token) -> Result<()>;

    /// Removes the stored token for an account. Missing entries are not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn delete(&self, account_id: &str) -> Result<()>;
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, account_id: &str) -> Result<Option<Token>> {
        Ok(self.tokens.read().await.get(account_id).cloned())
    }

    async fn save(&self, account_id: &str, token: Token) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(account_id.to_string(), token);
        Ok(())
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        self.tokens.write().await.remove(account_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load() {
        let store = MemoryCredentialStore::new();
        store
            .save("acc1", Token::new("at").with_refresh_token("rt"))
            .await
            .unwrap();

        let token = store.load("acc1").await.unwrap().unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let store = MemoryCredentialStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryCredentialStore::new();
        store.save("acc1", Token::new("at")).await.unwrap();
        store.delete("acc1").await.unwrap();
        store.delete("acc1").await.unwrap();
        assert!(store.load("acc1").await.unwrap().is_none());
    }
}
