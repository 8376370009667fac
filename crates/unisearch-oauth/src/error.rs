//! Error types for `OAuth2` operations.

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error returned by the token provider.
    #[error("provider error: {code} - {message}")]
    Provider {
        /// Provider error code (e.g., `invalid_grant`).
        code: String,
        /// Human-readable description.
        message: String,
    },

    /// The refresh token is invalid or expired; the user must re-authorize.
    #[error("refresh token rejected, manual re-authorization required")]
    ReauthRequired,

    /// No refresh token available.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// Invalid token response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Creates a provider error from an error code and description.
    ///
    /// The codes the provider uses for a dead refresh token map to
    /// [`Error::ReauthRequired`] so callers can distinguish "user must
    /// re-authorize" from transient failures.
    #[must_use]
    pub fn from_provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        match code.as_str() {
            "invalid_grant" | "token_not_found" | "invalid_refresh_token" => Self::ReauthRequired,
            _ => Self::Provider {
                code,
                message: message.into(),
            },
        }
    }

    /// Returns true if the error means the user must manually re-authorize.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired | Self::NoRefreshToken)
    }
}
