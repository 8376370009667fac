//! Error types for the aggregation engine.
//!
//! Only request-validation failures surface to callers of `search`; platform
//! and account failures are folded into the response's per-platform status.

use unisearch_connector::{ConnectorError, Platform};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the engine reports to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The search query was empty or whitespace.
    #[error("search query is empty")]
    EmptyQuery,

    /// No connected accounts matched the request's platform/account scope.
    #[error("no connected accounts to search")]
    NoAccounts,

    /// The request named a platform tag we do not recognize.
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    /// An operation targeted a platform with no loaded connector.
    #[error("no connector loaded for {0}")]
    ConnectorNotLoaded(Platform),

    /// An operation targeted an account the registry does not know.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// A connector error escaped a pass-through operation.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// JSON encoding failure (fingerprint canonicalization).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::EmptyQuery.to_string(), "search query is empty");
        assert_eq!(
            Error::ConnectorNotLoaded(Platform::Slack).to_string(),
            "no connector loaded for slack"
        );
        assert_eq!(
            Error::UnknownPlatform("teams".to_string()).to_string(),
            "unknown platform: teams"
        );
    }
}
