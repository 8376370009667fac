//! Slack Web API client: wire DTOs, the [`SlackApi`] seam, and the reqwest
//! implementation.
//!
//! Slack reports failure in-band: `{"ok": false, "error": "..."}` with HTTP
//! 200. Cursors live in `response_metadata.next_cursor`, and an empty cursor
//! string means the listing is exhausted.

use crate::error::{ConnectorError, Result};
use crate::model::Platform;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// One channel (container).
#[derive(Debug, Clone, Deserialize)]
pub struct SlackChannel {
    /// Channel id (`C...`, `D...` for DMs).
    pub id: String,
    /// Channel name; DMs have none.
    #[serde(default)]
    pub name: String,
}

/// Cursor holder on paginated responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    /// Cursor for the next page; empty string when exhausted.
    #[serde(default)]
    pub next_cursor: String,
}

/// `conversations.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelPage {
    /// Whether the call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// In-band error code when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Channels on this page.
    #[serde(default)]
    pub channels: Vec<SlackChannel>,
    /// Cursor holder.
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

/// A file attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackFile {
    /// File name.
    #[serde(default)]
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mimetype: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Private download URL.
    #[serde(default)]
    pub url_private: Option<String>,
}

/// One raw message from `conversations.history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackMessage {
    /// Timestamp-id as fractional epoch seconds ("1706000000.123456").
    #[serde(default)]
    pub ts: String,
    /// Sender user id.
    #[serde(default)]
    pub user: Option<String>,
    /// Sender display name, present for bot/app messages.
    #[serde(default)]
    pub username: Option<String>,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Message subtype (joins, topic changes, ...).
    #[serde(default)]
    pub subtype: Option<String>,
    /// Attached files.
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

/// `conversations.history` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPage {
    /// Whether the call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// In-band error code when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Messages on this page, newest first.
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
    /// Whether more pages exist.
    #[serde(default)]
    pub has_more: bool,
    /// Cursor holder.
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

/// `auth.test` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackIdentity {
    /// Whether the call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// In-band error code when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Authorized user name.
    #[serde(default)]
    pub user: String,
    /// Authorized user id.
    #[serde(default)]
    pub user_id: String,
}

/// Maps Slack's in-band error strings to the connector taxonomy.
pub(crate) fn classify_error(error: &str, container: &str) -> ConnectorError {
    match error {
        "token_expired" | "invalid_auth" | "not_authed" => ConnectorError::AuthExpired,
        "token_revoked" | "account_inactive" => ConnectorError::ReauthRequired,
        "channel_not_found" | "not_in_channel" | "missing_scope" => ConnectorError::Permission {
            container: container.to_string(),
        },
        other => ConnectorError::invalid(Platform::Slack, format!("{container}: {other}")),
    }
}

/// Slack Web API surface the connector needs.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Lists channels the user can see, one cursor page at a time.
    ///
    /// # Errors
    ///
    /// Fails on network errors; in-band `ok: false` is returned as data for
    /// the connector to classify.
    async fn list_channels(&self, token: &str, cursor: Option<&str>) -> Result<ChannelPage>;

    /// Fetches one page of a channel's history, optionally time-bounded
    /// (fractional epoch seconds).
    ///
    /// # Errors
    ///
    /// Fails on network errors.
    async fn history(
        &self,
        token: &str,
        channel: &str,
        cursor: Option<&str>,
        oldest: Option<String>,
        latest: Option<String>,
    ) -> Result<HistoryPage>;

    /// Identity probe used by connection validation.
    ///
    /// # Errors
    ///
    /// Fails on network errors.
    async fn auth_test(&self, token: &str) -> Result<SlackIdentity>;
}

/// Reqwest-backed [`SlackApi`].
#[derive(Debug, Clone)]
pub struct SlackHttp {
    base_url: Url,
    http_client: reqwest::Client,
}

impl SlackHttp {
    /// Default Slack Web API base.
    pub const DEFAULT_BASE_URL: &'static str = "https://slack.com/api/";

    /// Creates a client against the given API base.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConnectorError::invalid(Platform::Slack, e.to_string()))?;
        Ok(Self {
            base_url,
            http_client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        self.base_url
            .join(method)
            .map_err(|e| ConnectorError::invalid(Platform::Slack, e.to_string()))
    }
}

#[async_trait]
impl SlackApi for SlackHttp {
    async fn list_channels(&self, token: &str, cursor: Option<&str>) -> Result<ChannelPage> {
        let mut url = self.endpoint("conversations.list")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("types", "public_channel,private_channel,im");
            pairs.append_pair("limit", "200");
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor);
            }
        }
        Ok(self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?)
    }

    async fn history(
        &self,
        token: &str,
        channel: &str,
        cursor: Option<&str>,
        oldest: Option<String>,
        latest: Option<String>,
    ) -> Result<HistoryPage> {
        let mut url = self.endpoint("conversations.history")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("channel", channel);
            pairs.append_pair("limit", "200");
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor);
            }
            if let Some(oldest) = &oldest {
                pairs.append_pair("oldest", oldest);
            }
            if let Some(latest) = &latest {
                pairs.append_pair("latest", latest);
            }
        }
        Ok(self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?)
    }

    async fn auth_test(&self, token: &str) -> Result<SlackIdentity> {
        let url = self.endpoint("auth.test")?;
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?)
    }
}
