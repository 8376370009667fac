//! Per-account authentication state machine and auth call results.

use serde::{Deserialize, Serialize};

/// Authentication lifecycle of one account on one connector.
///
/// ```text
/// Unauthenticated -> Authenticating -> Authenticated
///     Authenticated -> TokenExpired          (401 / expiry observed)
///     TokenExpired  -> Reauthorizing         (explicit refresh_token call)
///     Reauthorizing -> Authenticated         (refresh succeeded)
///     Reauthorizing -> RequiresManualReauth  (refresh token dead, terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthState {
    /// No credentials yet.
    #[default]
    Unauthenticated,
    /// Code exchange in progress.
    Authenticating,
    /// Holding a usable access token.
    Authenticated,
    /// Access token rejected or expired; refresh has not started.
    TokenExpired,
    /// Refresh in progress.
    Reauthorizing,
    /// Refresh token is dead; only a new user authorization recovers.
    RequiresManualReauth,
}

impl AuthState {
    /// True when searches may run in this state.
    #[must_use]
    pub const fn can_search(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// True for the terminal state that only a fresh authorization leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RequiresManualReauth)
    }

    /// Attempts a transition, returning the new state or `None` when the
    /// transition is illegal from the current state.
    #[must_use]
    pub const fn transition(self, event: AuthEvent) -> Option<Self> {
        match (self, event) {
            (Self::Unauthenticated | Self::RequiresManualReauth, AuthEvent::BeginAuth) => {
                Some(Self::Authenticating)
            }
            (Self::Authenticating | Self::Reauthorizing, AuthEvent::AuthSucceeded) => {
                Some(Self::Authenticated)
            }
            (Self::Authenticating, AuthEvent::AuthFailed) => Some(Self::Unauthenticated),
            (Self::Authenticated, AuthEvent::TokenRejected) => Some(Self::TokenExpired),
            (Self::TokenExpired, AuthEvent::BeginRefresh) => Some(Self::Reauthorizing),
            (Self::Reauthorizing, AuthEvent::RefreshRejected) => Some(Self::RequiresManualReauth),
            _ => None,
        }
    }
}

/// Events driving [`AuthState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A code exchange started.
    BeginAuth,
    /// Code exchange or refresh produced a usable token.
    AuthSucceeded,
    /// Code exchange failed.
    AuthFailed,
    /// The platform rejected the access token (401/expiry).
    TokenRejected,
    /// A refresh started.
    BeginRefresh,
    /// The provider rejected the refresh token itself.
    RefreshRejected,
}

/// Identity of the user behind an account, from the platform's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Platform-side user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address, when the platform exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Outcome of `authenticate` or `refresh_token`.
#[derive(Debug, Clone, Default)]
pub struct AuthResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// New access token on success.
    pub access_token: Option<String>,
    /// New refresh token on success, if the provider rotated or issued one.
    pub refresh_token: Option<String>,
    /// Authorizing user, populated by code exchange.
    pub user_info: Option<UserInfo>,
    /// Set when the refresh token is dead and the user must re-authorize.
    /// Never set for transient failures.
    pub requires_reauth: bool,
    /// Error description on failure.
    pub error: Option<String>,
}

impl AuthResult {
    /// Successful result carrying new token material.
    #[must_use]
    pub fn ok(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            success: true,
            access_token: Some(access_token.into()),
            refresh_token,
            ..Default::default()
        }
    }

    /// Failed result for a transient/ordinary error.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Failed result signalling that manual re-authorization is required.
    #[must_use]
    pub fn reauth_required(error: impl Into<String>) -> Self {
        Self {
            success: false,
            requires_reauth: true,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attaches the authorizing user's identity.
    #[must_use]
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user_info = Some(user);
        self
    }
}
