//! Connector construction.
//!
//! [`build_connector`] is the only place that branches on [`Platform`];
//! everything downstream works against the [`Connector`] trait object.

use crate::authenticator::Authenticator;
use crate::connector::Connector;
use crate::error::{ConnectorError, Result};
use crate::gmail::{GmailConnector, api::GmailHttp};
use crate::lark::{LarkConnector, api::LarkHttp};
use crate::model::Platform;
use crate::slack::{SlackConnector, api::SlackHttp};
use std::sync::Arc;
use unisearch_oauth::{CredentialStore, HttpTokenProvider};

/// Everything needed to stand up one platform's connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Which platform to build for.
    pub platform: Platform,
    /// Base URL of the token-issuance service for this platform.
    pub auth_base_url: String,
    /// Platform API base; `None` uses the platform's production endpoint.
    pub api_base_url: Option<String>,
    /// App id, required by Lark's tenant token derivation.
    pub app_id: Option<String>,
    /// App secret, required by Lark's tenant token derivation.
    pub app_secret: Option<String>,
    /// Workspace domain used in Slack deep links ("acme" in acme.slack.com).
    pub team_domain: Option<String>,
    /// Per-container page cap override.
    pub page_cap: Option<usize>,
}

impl ConnectorConfig {
    /// Minimal config for a platform.
    #[must_use]
    pub fn new(platform: Platform, auth_base_url: impl Into<String>) -> Self {
        Self {
            platform,
            auth_base_url: auth_base_url.into(),
            api_base_url: None,
            app_id: None,
            app_secret: None,
            team_domain: None,
            page_cap: None,
        }
    }

    /// Sets the platform API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets the Lark app credentials.
    #[must_use]
    pub fn with_app_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_id = Some(app_id.into());
        self.app_secret = Some(app_secret.into());
        self
    }

    /// Sets the Slack workspace domain.
    #[must_use]
    pub fn with_team_domain(mut self, domain: impl Into<String>) -> Self {
        self.team_domain = Some(domain.into());
        self
    }

    /// Sets the per-container page cap.
    #[must_use]
    pub const fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = Some(page_cap);
        self
    }
}

/// Builds a ready-to-use connector for the configured platform.
///
/// # Errors
///
/// Returns an error if a URL in the config is invalid or a required
/// platform-specific field (Lark app credentials) is missing.
pub fn build_connector(
    config: &ConnectorConfig,
    store: Arc<dyn CredentialStore>,
) -> Result<Arc<dyn Connector>> {
    let provider = Arc::new(HttpTokenProvider::new(&config.auth_base_url)?);
    let auth = Authenticator::new(config.platform, provider, store);

    match config.platform {
        Platform::Gmail => {
            let base = config
                .api_base_url
                .as_deref()
                .unwrap_or(GmailHttp::DEFAULT_BASE_URL);
            let mut connector = GmailConnector::new(Arc::new(GmailHttp::new(base)?), auth);
            if let Some(cap) = config.page_cap {
                connector = connector.with_page_cap(cap);
            }
            Ok(Arc::new(connector))
        }
        Platform::Slack => {
            let base = config
                .api_base_url
                .as_deref()
                .unwrap_or(SlackHttp::DEFAULT_BASE_URL);
            let domain = config.team_domain.clone().unwrap_or_default();
            let mut connector =
                SlackConnector::new(Arc::new(SlackHttp::new(base)?), auth, domain);
            if let Some(cap) = config.page_cap {
                connector = connector.with_page_cap(cap);
            }
            Ok(Arc::new(connector))
        }
        Platform::Lark => {
            let (Some(app_id), Some(app_secret)) = (&config.app_id, &config.app_secret) else {
                return Err(ConnectorError::invalid(
                    Platform::Lark,
                    "app credentials are required",
                ));
            };
            let base = config
                .api_base_url
                .as_deref()
                .unwrap_or(LarkHttp::DEFAULT_BASE_URL);
            let mut connector = LarkConnector::new(
                Arc::new(LarkHttp::new(base)?),
                auth,
                app_id.clone(),
                app_secret.clone(),
            );
            if let Some(cap) = config.page_cap {
                connector = connector.with_page_cap(cap);
            }
            Ok(Arc::new(connector))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use unisearch_oauth::MemoryCredentialStore;

    fn store() -> Arc<dyn CredentialStore> {
        Arc::new(MemoryCredentialStore::new())
    }

    #[test]
    fn builds_each_platform() {
        let gmail = build_connector(
            &ConnectorConfig::new(Platform::Gmail, "https://auth.example.com/gmail/"),
            store(),
        )
        .unwrap();
        assert_eq!(gmail.platform(), Platform::Gmail);

        let slack = build_connector(
            &ConnectorConfig::new(Platform::Slack, "https://auth.example.com/slack/")
                .with_team_domain("acme"),
            store(),
        )
        .unwrap();
        assert_eq!(slack.platform(), Platform::Slack);

        let lark = build_connector(
            &ConnectorConfig::new(Platform::Lark, "https://auth.example.com/lark/")
                .with_app_credentials("app-id", "app-secret"),
            store(),
        )
        .unwrap();
        assert_eq!(lark.platform(), Platform::Lark);
    }

    #[test]
    fn lark_without_app_credentials_is_rejected() {
        let result = build_connector(
            &ConnectorConfig::new(Platform::Lark, "https://auth.example.com/lark/"),
            store(),
        );
        assert!(matches!(result, Err(ConnectorError::InvalidResponse { .. })));
    }

    #[test]
    fn bad_auth_url_is_rejected() {
        let result = build_connector(
            &ConnectorConfig::new(Platform::Gmail, "not a url"),
            store(),
        );
        assert!(result.is_err());
    }
}
