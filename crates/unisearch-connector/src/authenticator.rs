//! Shared per-account OAuth handling embedded in every connector.
//!
//! Code exchange and refresh go through the opaque remote token provider;
//! token material lives in the externally-supplied credential store. Each
//! connector owns one `Authenticator` and drives the [`AuthState`] machine
//! through it.

use crate::auth::{AuthEvent, AuthResult, AuthState, UserInfo};
use crate::error::{ConnectorError, Result};
use crate::model::{AccountId, Platform};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use unisearch_oauth::{CredentialStore, Token, TokenProvider};

/// Per-account auth state and token access for one connector.
pub struct Authenticator {
    platform: Platform,
    provider: Arc<dyn TokenProvider>,
    credentials: Arc<dyn CredentialStore>,
    states: RwLock<HashMap<AccountId, AuthState>>,
}

impl Authenticator {
    /// Creates an authenticator for a platform.
    pub fn new(
        platform: Platform,
        provider: Arc<dyn TokenProvider>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            platform,
            provider,
            credentials,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Current auth state of an account. Accounts with stored credentials
    /// but no recorded state are considered authenticated.
    pub async fn state(&self, account_id: &AccountId) -> AuthState {
        if let Some(state) = self.states.read().await.get(account_id) {
            return *state;
        }
        match self.credentials.load(account_id.as_str()).await {
            Ok(Some(_)) => AuthState::Authenticated,
            _ => AuthState::Unauthenticated,
        }
    }

    async fn apply(&self, account_id: &AccountId, event: AuthEvent) {
        let mut states = self.states.write().await;
        let current = states
            .get(account_id)
            .copied()
            .unwrap_or(AuthState::Authenticated);
        if let Some(next) = current.transition(event) {
            states.insert(account_id.clone(), next);
        } else {
            tracing::debug!(
                platform = %self.platform,
                account = %account_id,
                ?current,
                ?event,
                "ignoring illegal auth transition"
            );
        }
    }

    /// Exchanges an authorization code for tokens and stores them under the
    /// composed account id. Errors are folded into the [`AuthResult`].
    pub async fn authenticate(&self, code: &str) -> AuthResult {
        let exchanged = match self.provider.exchange_code(code).await {
            Ok(exchanged) => exchanged,
            Err(err) => {
                tracing::warn!(platform = %self.platform, error = %err, "code exchange failed");
                return AuthResult::failed(err.to_string());
            }
        };

        let account_id = AccountId::compose(self.platform, &exchanged.identity.id);
        let token = exchanged.token.clone();
        if let Err(err) = self
            .credentials
            .save(account_id.as_str(), exchanged.token)
            .await
        {
            return AuthResult::failed(err.to_string());
        }

        self.states
            .write()
            .await
            .insert(account_id.clone(), AuthState::Authenticated);
        tracing::info!(platform = %self.platform, account = %account_id, "account authenticated");

        AuthResult::ok(token.access_token, token.refresh_token).with_user(UserInfo {
            id: exchanged.identity.id,
            name: exchanged.identity.name,
            email: exchanged.identity.email,
        })
    }

    /// Refreshes the stored token. A missing or dead refresh token yields
    /// `requires_reauth: true` and parks the account in the terminal state;
    /// transient failures do not.
    pub async fn refresh(&self, account_id: &AccountId) -> AuthResult {
        let stored = match self.credentials.load(account_id.as_str()).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return AuthResult::reauth_required("no stored credentials");
            }
            Err(err) => return AuthResult::failed(err.to_string()),
        };

        let Some(refresh_token) = stored.refresh_token.clone() else {
            self.park_reauth(account_id).await;
            return AuthResult::reauth_required("no refresh token stored");
        };

        self.apply(account_id, AuthEvent::TokenRejected).await;
        self.apply(account_id, AuthEvent::BeginRefresh).await;

        match self.provider.refresh(&refresh_token).await {
            Ok(token) => {
                let access = token.access_token.clone();
                let refresh = token.refresh_token.clone();
                if let Err(err) = self.credentials.save(account_id.as_str(), token).await {
                    return AuthResult::failed(err.to_string());
                }
                self.apply(account_id, AuthEvent::AuthSucceeded).await;
                AuthResult::ok(access, refresh)
            }
            Err(err) if err.requires_reauth() => {
                self.apply(account_id, AuthEvent::RefreshRejected).await;
                tracing::warn!(platform = %self.platform, account = %account_id, "refresh token rejected, manual re-auth required");
                AuthResult::reauth_required(err.to_string())
            }
            Err(err) => {
                // Transient: leave the account refreshable.
                self.states
                    .write()
                    .await
                    .insert(account_id.clone(), AuthState::TokenExpired);
                AuthResult::failed(err.to_string())
            }
        }
    }

    async fn park_reauth(&self, account_id: &AccountId) {
        self.states
            .write()
            .await
            .insert(account_id.clone(), AuthState::RequiresManualReauth);
    }

    /// Returns a usable access token for an account.
    ///
    /// # Errors
    ///
    /// [`ConnectorError::NotConnected`] when no credentials are stored,
    /// [`ConnectorError::AuthExpired`] when the stored token has expired
    /// (callers refresh and retry).
    pub async fn access_token(&self, account_id: &AccountId) -> Result<String> {
        let token: Token = self
            .credentials
            .load(account_id.as_str())
            .await
            .map_err(|err| ConnectorError::Transient(err.to_string()))?
            .ok_or_else(|| ConnectorError::NotConnected(account_id.to_string()))?;

        if self.state(account_id).await.is_terminal() {
            return Err(ConnectorError::ReauthRequired);
        }
        if token.is_expired() {
            self.apply(account_id, AuthEvent::TokenRejected).await;
            return Err(ConnectorError::AuthExpired);
        }
        Ok(token.access_token)
    }

    /// Marks an account's access token as rejected by the platform.
    pub async fn mark_expired(&self, account_id: &AccountId) {
        self.apply(account_id, AuthEvent::TokenRejected).await;
    }

    /// Drops in-memory auth state. Stored credentials are untouched.
    pub async fn reset(&self) {
        self.states.write().await.clear();
    }
}
