//! Error types for connector operations.

use crate::model::Platform;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors that can occur while talking to a platform.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Transient network failure; retryable, does not change account status.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The access token was rejected; an internal refresh should be tried.
    #[error("access token expired or rejected")]
    AuthExpired,

    /// The refresh token itself is dead; the user must re-authorize.
    #[error("re-authorization required")]
    ReauthRequired,

    /// Permission or scope error on one container; skip it, continue others.
    #[error("permission denied for container {container}")]
    Permission {
        /// Container (conversation/channel/label) that was denied.
        container: String,
    },

    /// The platform returned a payload we could not interpret.
    #[error("invalid response from {platform}: {message}")]
    InvalidResponse {
        /// Platform that produced the payload.
        platform: Platform,
        /// What was wrong with it.
        message: String,
    },

    /// No stored credentials for the account.
    #[error("account {0} is not connected")]
    NotConnected(String),

    /// JSON decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// True for failures that are safe to retry without user action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True when the user must manually re-authorize the account.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired)
    }

    /// Builds an invalid-response error.
    #[must_use]
    pub fn invalid(platform: Platform, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            platform,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        // A 401 is an auth signal; everything else from the HTTP layer is
        // treated as transient.
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            Self::AuthExpired
        } else {
            Self::Transient(err.to_string())
        }
    }
}

impl From<unisearch_oauth::Error> for ConnectorError {
    fn from(err: unisearch_oauth::Error) -> Self {
        if err.requires_reauth() {
            Self::ReauthRequired
        } else {
            Self::Transient(err.to_string())
        }
    }
}
