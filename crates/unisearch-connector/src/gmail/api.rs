//! Gmail REST API client: wire DTOs, the [`GmailApi`] seam, and the reqwest
//! implementation.
//!
//! Gmail differs from the chat platforms in two ways the connector leans on:
//! the `q` parameter evaluates keyword, sender and date filters server-side,
//! and the message listing only returns ids, so every hit costs one
//! metadata hydration call.

use crate::error::{ConnectorError, Result};
use crate::model::Platform;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// One label (mailbox container).
#[derive(Debug, Clone, Deserialize)]
pub struct GmailLabel {
    /// Label id ("INBOX", "Label_17").
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// "system" or "user".
    #[serde(rename = "type", default)]
    pub label_type: String,
}

/// `users.labels.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    /// All labels in the mailbox.
    #[serde(default)]
    pub labels: Vec<GmailLabel>,
}

/// An id-only entry from `users.messages.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailMessageRef {
    /// Message id.
    pub id: String,
}

/// One page of `users.messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageIdPage {
    /// Ids on this page.
    #[serde(default)]
    pub messages: Vec<GmailMessageRef>,
    /// Cursor for the next page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One header from the metadata payload.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailHeader {
    /// Header name ("From", "Subject").
    pub name: String,
    /// Header value.
    #[serde(default)]
    pub value: String,
}

/// Metadata payload of a hydrated message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailPayload {
    /// Selected headers.
    #[serde(default)]
    pub headers: Vec<GmailHeader>,
    /// MIME type of the top-level part.
    #[serde(default)]
    pub mime_type: String,
    /// Filename when the top-level part is an attachment.
    #[serde(default)]
    pub filename: String,
}

/// A hydrated message (metadata format).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: String,
    /// Preview snippet.
    #[serde(default)]
    pub snippet: String,
    /// Internal date as a string of epoch milliseconds.
    #[serde(default)]
    pub internal_date: String,
    /// Metadata payload.
    #[serde(default)]
    pub payload: GmailPayload,
}

impl GmailMessage {
    /// Value of a named header, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// `users.getProfile` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailProfile {
    /// The account's email address.
    #[serde(default)]
    pub email_address: String,
}

/// Gmail REST surface the connector needs.
#[async_trait]
pub trait GmailApi: Send + Sync {
    /// Lists all labels in the mailbox.
    ///
    /// # Errors
    ///
    /// Fails on network or auth errors.
    async fn list_labels(&self, token: &str) -> Result<LabelList>;

    /// Lists message ids under a label matching the `q` expression.
    ///
    /// # Errors
    ///
    /// Fails on network or auth errors.
    async fn list_message_ids(
        &self,
        token: &str,
        label_id: &str,
        q: &str,
        page_token: Option<&str>,
    ) -> Result<MessageIdPage>;

    /// Hydrates one message in metadata format.
    ///
    /// # Errors
    ///
    /// Fails on network or auth errors.
    async fn get_message(&self, token: &str, id: &str) -> Result<GmailMessage>;

    /// Fetches the mailbox profile; used by connection probes.
    ///
    /// # Errors
    ///
    /// Fails on network or auth errors.
    async fn profile(&self, token: &str) -> Result<GmailProfile>;
}

/// Reqwest-backed [`GmailApi`].
#[derive(Debug, Clone)]
pub struct GmailHttp {
    base_url: Url,
    http_client: reqwest::Client,
}

impl GmailHttp {
    /// Default Gmail API base (the `users/me` subtree).
    pub const DEFAULT_BASE_URL: &'static str =
        "https://gmail.googleapis.com/gmail/v1/users/me/";

    /// Creates a client against the given API base.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConnectorError::invalid(Platform::Gmail, e.to_string()))?;
        Ok(Self {
            base_url,
            http_client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ConnectorError::invalid(Platform::Gmail, e.to_string()))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            reqwest::StatusCode::UNAUTHORIZED => Err(ConnectorError::AuthExpired),
            reqwest::StatusCode::FORBIDDEN => Err(ConnectorError::Permission {
                container: context.to_string(),
            }),
            status => Err(ConnectorError::invalid(
                Platform::Gmail,
                format!("{context}: HTTP {status}"),
            )),
        }
    }
}

#[async_trait]
impl GmailApi for GmailHttp {
    async fn list_labels(&self, token: &str) -> Result<LabelList> {
        let url = self.endpoint("labels")?;
        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        Self::decode(response, "labels").await
    }

    async fn list_message_ids(
        &self,
        token: &str,
        label_id: &str,
        q: &str,
        page_token: Option<&str>,
    ) -> Result<MessageIdPage> {
        let mut url = self.endpoint("messages")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("labelIds", label_id);
            pairs.append_pair("q", q);
            pairs.append_pair("maxResults", "100");
            if let Some(cursor) = page_token {
                pairs.append_pair("pageToken", cursor);
            }
        }
        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        Self::decode(response, label_id).await
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<GmailMessage> {
        let mut url = self.endpoint(&format!("messages/{id}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "metadata");
            pairs.append_pair("metadataHeaders", "From");
            pairs.append_pair("metadataHeaders", "Subject");
        }
        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        Self::decode(response, id).await
    }

    async fn profile(&self, token: &str) -> Result<GmailProfile> {
        let url = self.endpoint("profile")?;
        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        Self::decode(response, "profile").await
    }
}
