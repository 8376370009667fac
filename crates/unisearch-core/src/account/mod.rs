//! Connected accounts and the registry tracking them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use unisearch_connector::{AccountId, Platform};

/// Connection health of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Credentials present and last check succeeded.
    #[default]
    Connected,
    /// Explicitly disconnected; credentials removed.
    Disconnected,
    /// Auth is broken (dead refresh token); excluded from dispatch until the
    /// user re-authorizes.
    Error,
}

/// One connected account on one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Canonical account id ("lark:ou_123").
    pub id: AccountId,
    /// Platform the account lives on.
    pub platform: Platform,
    /// Platform-side user id.
    pub user_id: String,
    /// Display name shown to the user.
    pub display_name: String,
    /// Connection health.
    pub status: ConnectionStatus,
}

impl Account {
    /// Creates a connected account.
    #[must_use]
    pub fn new(
        platform: Platform,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            id: AccountId::compose(platform, &user_id),
            platform,
            user_id,
            display_name: display_name.into(),
            status: ConnectionStatus::Connected,
        }
    }

    /// True when the account may be dispatched to.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Registry of connected accounts, shared across concurrent searches.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl AccountRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub async fn add(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    /// Removes an account, returning it if it existed.
    pub async fn remove(&self, id: &AccountId) -> Option<Account> {
        self.accounts.write().await.remove(id)
    }

    /// Looks up one account.
    pub async fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts.read().await.get(id).cloned()
    }

    /// Updates an account's status. No-op when the account is unknown.
    pub async fn set_status(&self, id: &AccountId, status: ConnectionStatus) {
        if let Some(account) = self.accounts.write().await.get_mut(id) {
            account.status = status;
        }
    }

    /// All accounts, in no particular order.
    pub async fn list(&self) -> Vec<Account> {
        self.accounts.read().await.values().cloned().collect()
    }

    /// Accounts currently eligible for dispatch.
    pub async fn connected_accounts(&self) -> Vec<Account> {
        self.accounts
            .read()
            .await
            .values()
            .filter(|a| a.is_searchable())
            .cloned()
            .collect()
    }

    /// Connected accounts on one platform.
    pub async fn accounts_for(&self, platform: Platform) -> Vec<Account> {
        self.accounts
            .read()
            .await
            .values()
            .filter(|a| a.platform == platform && a.is_searchable())
            .cloned()
            .collect()
    }
}
