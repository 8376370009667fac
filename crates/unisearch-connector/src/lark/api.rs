//! Lark Open API client: wire DTOs, the [`LarkApi`] seam, and the reqwest
//! implementation.
//!
//! Every response rides the platform's `{code, msg, data}` envelope; a
//! non-zero `code` is an error, with the invalid-token codes mapped to
//! [`ConnectorError::AuthExpired`].

use crate::error::{ConnectorError, Result};
use crate::model::Platform;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Lark error codes meaning the access token is no longer usable.
const INVALID_TOKEN_CODES: [i64; 2] = [99_991_663, 99_991_664];
/// Lark error code for missing chat permission.
const FORBIDDEN_CODE: i64 = 230_002;

/// One chat (conversation container).
#[derive(Debug, Clone, Deserialize)]
pub struct LarkChat {
    /// Chat id (`oc_...`).
    pub chat_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// One page of the chat listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatPage {
    /// Chats on this page.
    #[serde(default)]
    pub items: Vec<LarkChat>,
    /// Cursor for the next page.
    #[serde(default)]
    pub page_token: Option<String>,
    /// Whether more pages exist.
    #[serde(default)]
    pub has_more: bool,
}

/// Message sender as the wire reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LarkSenderId {
    /// Sender id (`ou_...` for users, app id for bots).
    #[serde(default)]
    pub id: String,
    /// "user" or "app".
    #[serde(default)]
    pub sender_type: String,
}

/// Message body; `content` is itself a JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LarkBody {
    /// JSON-encoded content, e.g. `{"text":"hello"}`.
    #[serde(default)]
    pub content: String,
}

/// One raw message.
#[derive(Debug, Clone, Deserialize)]
pub struct LarkMessage {
    /// Message id (`om_...`).
    pub message_id: String,
    /// "text", "image", "file", "post", ...
    #[serde(default)]
    pub msg_type: String,
    /// Creation time as a string of epoch milliseconds.
    #[serde(default)]
    pub create_time: String,
    /// Sender.
    #[serde(default)]
    pub sender: LarkSenderId,
    /// Body.
    #[serde(default)]
    pub body: LarkBody,
    /// Chat the message belongs to.
    #[serde(default)]
    pub chat_id: String,
}

/// One page of a chat's message listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePage {
    /// Messages on this page.
    #[serde(default)]
    pub items: Vec<LarkMessage>,
    /// Cursor for the next page.
    #[serde(default)]
    pub page_token: Option<String>,
    /// Whether more pages exist.
    #[serde(default)]
    pub has_more: bool,
}

/// Response envelope shared by all Lark endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, context: &str) -> Result<T> {
        if self.code != 0 {
            return Err(classify_code(self.code, &self.msg, context));
        }
        self.data
            .ok_or_else(|| ConnectorError::invalid(Platform::Lark, format!("{context}: empty data")))
    }
}

fn classify_code(code: i64, msg: &str, context: &str) -> ConnectorError {
    if INVALID_TOKEN_CODES.contains(&code) {
        ConnectorError::AuthExpired
    } else if code == FORBIDDEN_CODE {
        ConnectorError::Permission {
            container: context.to_string(),
        }
    } else {
        ConnectorError::invalid(Platform::Lark, format!("{context}: code {code}: {msg}"))
    }
}

/// Tenant access token grant (flat response, no `data` envelope).
#[derive(Debug, Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    expire: i64,
}

/// A freshly derived tenant token and its lifetime.
#[derive(Debug, Clone)]
pub struct TenantToken {
    /// The token.
    pub token: String,
    /// Seconds until expiry.
    pub expires_in: i64,
}

/// Lark Open API surface the connector needs.
#[async_trait]
pub trait LarkApi: Send + Sync {
    /// Derives the short-lived tenant access token from app credentials.
    ///
    /// # Errors
    ///
    /// Fails on network errors or when the app credentials are rejected.
    async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<TenantToken>;

    /// Lists the chats the user is in, one page at a time.
    ///
    /// # Errors
    ///
    /// Fails on network errors or a non-zero platform code.
    async fn list_chats(
        &self,
        tenant_token: &str,
        user_token: &str,
        page_token: Option<&str>,
    ) -> Result<ChatPage>;

    /// Lists messages in a chat, one page at a time, with an optional
    /// server-side time window (epoch seconds).
    ///
    /// # Errors
    ///
    /// Fails on network errors or a non-zero platform code.
    async fn list_messages(
        &self,
        tenant_token: &str,
        user_token: &str,
        chat_id: &str,
        page_token: Option<&str>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<MessagePage>;

    /// Fetches the authorized user's profile; used by connection probes.
    ///
    /// # Errors
    ///
    /// Fails on network errors or a non-zero platform code.
    async fn user_profile(&self, user_token: &str) -> Result<LarkProfile>;
}

/// Authorized user's profile.
#[derive(Debug, Clone, Deserialize)]
pub struct LarkProfile {
    /// User id.
    #[serde(default)]
    pub open_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Reqwest-backed [`LarkApi`].
#[derive(Debug, Clone)]
pub struct LarkHttp {
    base_url: Url,
    http_client: reqwest::Client,
}

impl LarkHttp {
    /// Default Lark Open API base.
    pub const DEFAULT_BASE_URL: &'static str = "https://open.larksuite.com/open-apis/";

    /// Creates a client against the given API base.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConnectorError::invalid(Platform::Lark, e.to_string()))?;
        Ok(Self {
            base_url,
            http_client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ConnectorError::invalid(Platform::Lark, e.to_string()))
    }
}

#[async_trait]
impl LarkApi for LarkHttp {
    async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<TenantToken> {
        let url = self.endpoint("auth/v3/tenant_access_token/internal")?;
        let response: TenantTokenResponse = self
            .http_client
            .post(url)
            .json(&serde_json::json!({ "app_id": app_id, "app_secret": app_secret }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(classify_code(response.code, &response.msg, "tenant token"));
        }
        Ok(TenantToken {
            token: response.tenant_access_token,
            expires_in: response.expire,
        })
    }

    async fn list_chats(
        &self,
        tenant_token: &str,
        user_token: &str,
        page_token: Option<&str>,
    ) -> Result<ChatPage> {
        let mut url = self.endpoint("im/v1/chats")?;
        if let Some(cursor) = page_token {
            url.query_pairs_mut().append_pair("page_token", cursor);
        }

        let envelope: Envelope<ChatPage> = self
            .http_client
            .get(url)
            .bearer_auth(user_token)
            .header("X-Tenant-Token", tenant_token)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data("chat listing")
    }

    async fn list_messages(
        &self,
        tenant_token: &str,
        user_token: &str,
        chat_id: &str,
        page_token: Option<&str>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint("im/v1/messages")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("container_id_type", "chat")
                .append_pair("container_id", chat_id);
            if let Some(cursor) = page_token {
                pairs.append_pair("page_token", cursor);
            }
            if let Some(start) = start_time {
                pairs.append_pair("start_time", &start.to_string());
            }
            if let Some(end) = end_time {
                pairs.append_pair("end_time", &end.to_string());
            }
        }

        let envelope: Envelope<MessagePage> = self
            .http_client
            .get(url)
            .bearer_auth(user_token)
            .header("X-Tenant-Token", tenant_token)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data(chat_id)
    }

    async fn user_profile(&self, user_token: &str) -> Result<LarkProfile> {
        let url = self.endpoint("authen/v1/user_info")?;
        let envelope: Envelope<LarkProfile> = self
            .http_client
            .get(url)
            .bearer_auth(user_token)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data("user profile")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_success_yields_data() {
        let raw = serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": {"items": [{"chat_id": "oc_1", "name": "general"}], "has_more": false}
        });
        let envelope: Envelope<ChatPage> = serde_json::from_value(raw).unwrap();
        let page = envelope.into_data("chat listing").unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].chat_id, "oc_1");
        assert!(!page.has_more);
    }

    #[test]
    fn invalid_token_code_is_auth_expired() {
        let raw = serde_json::json!({"code": 99_991_663, "msg": "token invalid"});
        let envelope: Envelope<ChatPage> = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            envelope.into_data("chat listing"),
            Err(ConnectorError::AuthExpired)
        ));
    }

    #[test]
    fn forbidden_code_is_permission_error() {
        let raw = serde_json::json!({"code": 230_002, "msg": "no access"});
        let envelope: Envelope<MessagePage> = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            envelope.into_data("oc_7"),
            Err(ConnectorError::Permission { container }) if container == "oc_7"
        ));
    }

    #[test]
    fn other_codes_are_invalid_response() {
        let raw = serde_json::json!({"code": 1_000_000, "msg": "weird"});
        let envelope: Envelope<ChatPage> = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            envelope.into_data("chat listing"),
            Err(ConnectorError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn message_page_decodes_string_timestamps() {
        let raw = serde_json::json!({
            "items": [{
                "message_id": "om_1",
                "msg_type": "text",
                "create_time": "1706000000000",
                "sender": {"id": "ou_9", "sender_type": "user"},
                "body": {"content": "{\"text\":\"hello\"}"},
                "chat_id": "oc_1"
            }],
            "page_token": "p2",
            "has_more": true
        });
        let page: MessagePage = serde_json::from_value(raw).unwrap();
        assert_eq!(page.items[0].create_time, "1706000000000");
        assert!(page.has_more);
        assert_eq!(page.page_token.as_deref(), Some("p2"));
    }
}
