//! Normalized message model shared by all connectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Platform a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Email (Gmail REST API).
    Gmail,
    /// Team chat (Slack Web API).
    Slack,
    /// Enterprise IM (Lark/Feishu Open API).
    Lark,
}

impl Platform {
    /// Stable string tag used in results and cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Slack => "slack",
            Self::Lark => "lark",
        }
    }

    /// All supported platforms.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Gmail, Self::Slack, Self::Lark]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gmail" | "email" => Ok(Self::Gmail),
            "slack" => Ok(Self::Slack),
            "lark" | "feishu" => Ok(Self::Lark),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Opaque identifier of a connected account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    /// Creates a new account id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Composes the canonical account id for a platform user, unique across
    /// platforms ("lark:ou_123").
    #[must_use]
    pub fn compose(platform: Platform, user_id: &str) -> Self {
        Self(format!("{}:{user_id}", platform.as_str()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// A file share.
    File,
    /// An image.
    Image,
    /// Anything else (stickers, system notices, cards).
    Other,
}

/// Who sent a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sender {
    /// Display name.
    pub name: String,
    /// Platform-side user id.
    pub id: String,
    /// Email address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// An attachment referenced by a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// File name.
    pub name: String,
    /// MIME type, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Download URL, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One normalized search hit. Produced once per raw message and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResult {
    /// Platform-side message id.
    pub id: String,
    /// Originating platform.
    pub platform: Platform,
    /// Sender identity.
    pub sender: Sender,
    /// Full message text.
    pub content: String,
    /// Short preview.
    pub snippet: String,
    /// Message time, normalized to UTC.
    pub timestamp: DateTime<Utc>,
    /// Label of the containing conversation/channel/mailbox.
    pub channel: String,
    /// Deep link into the platform's own client.
    pub link: String,
    /// Message kind.
    pub message_type: MessageType,
    /// Attachments, when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Raw platform-specific fields worth preserving.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Account this hit was found under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl MessageResult {
    /// Builds the preview snippet from content (first 120 chars).
    #[must_use]
    pub fn snippet_of(content: &str) -> String {
        let mut snippet: String = content.chars().take(120).collect();
        if content.chars().count() > 120 {
            snippet.push('…');
        }
        snippet
    }
}
