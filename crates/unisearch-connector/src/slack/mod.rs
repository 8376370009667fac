//! Slack (team chat) connector.
//!
//! Channels and history are both cursor-paginated; an empty `next_cursor`
//! string means exhaustion. The history endpoint takes the time range
//! natively (`oldest`/`latest` as fractional epoch seconds); keyword, sender
//! and message-type filters are applied client-side.

pub mod api;

use crate::auth::{AuthResult, AuthState};
use crate::authenticator::Authenticator;
use crate::cancel::CancelToken;
use crate::connector::{Connector, sort_descending};
use crate::error::{ConnectorError, Result};
use crate::filter::message_passes;
use crate::model::{AccountId, Attachment, MessageResult, MessageType, Platform, Sender};
use crate::progress::{ProgressSink, SearchStage, emit};
use crate::request::ConnectorSearchRequest;
use crate::time::parse_epoch_secs;
use api::{SlackApi, SlackChannel, SlackMessage, classify_error};
use async_trait::async_trait;
use std::sync::Arc;

/// Pages fetched per channel before giving up on exhaustion.
const DEFAULT_PAGE_CAP: usize = 10;

/// Connector for Slack.
pub struct SlackConnector {
    api: Arc<dyn SlackApi>,
    auth: Authenticator,
    team_domain: String,
    page_cap: usize,
}

impl SlackConnector {
    /// Creates a connector over the given API client and authenticator.
    /// `team_domain` feeds the archive deep links
    /// (`https://{team}.slack.com/archives/...`).
    #[must_use]
    pub fn new(
        api: Arc<dyn SlackApi>,
        auth: Authenticator,
        team_domain: impl Into<String>,
    ) -> Self {
        Self {
            api,
            auth,
            team_domain: team_domain.into(),
            page_cap: DEFAULT_PAGE_CAP,
        }
    }

    /// Overrides the per-channel page cap.
    #[must_use]
    pub const fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap;
        self
    }

    async fn list_all_channels(
        &self,
        token: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<SlackChannel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let page = self.api.list_channels(token, cursor.as_deref()).await?;
            if !page.ok {
                let error = page.error.as_deref().unwrap_or("unknown_error");
                return Err(classify_error(error, "conversations.list"));
            }
            channels.extend(page.channels);
            let next = page.response_metadata.next_cursor;
            if next.is_empty() {
                break;
            }
            cursor = Some(next);
        }

        Ok(channels)
    }

    #[allow(clippy::too_many_arguments)]
    async fn search_channel(
        &self,
        token: &str,
        channel: &SlackChannel,
        request: &ConnectorSearchRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressSink>,
        counters: &mut (usize, usize),
    ) -> Result<Vec<MessageResult>> {
        let range = request.filters.date_range.unwrap_or_default();
        let oldest = range.after.map(|t| format!("{}.000000", t.timestamp()));
        let latest = range.before.map(|t| format!("{}.000000", t.timestamp()));

        let mut matches = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            if cancel.is_cancelled() || matches.len() >= request.max_results {
                break;
            }
            let page = self
                .api
                .history(
                    token,
                    &channel.id,
                    cursor.as_deref(),
                    oldest.clone(),
                    latest.clone(),
                )
                .await?;
            if !page.ok {
                let error = page.error.as_deref().unwrap_or("unknown_error");
                return Err(classify_error(error, &channel.id));
            }

            for raw in &page.messages {
                counters.0 += 1;
                if let Some(message) = self.normalize(raw, channel, request) {
                    counters.1 += 1;
                    matches.push(message);
                    if matches.len() >= request.max_results {
                        break;
                    }
                }
            }
            emit(progress, SearchStage::FetchingMessages, counters.0, counters.1);

            pages += 1;
            if !page.has_more || pages >= self.page_cap {
                break;
            }
            let next = page.response_metadata.next_cursor;
            if next.is_empty() {
                break;
            }
            cursor = Some(next);
        }

        Ok(matches)
    }

    fn normalize(
        &self,
        raw: &SlackMessage,
        channel: &SlackChannel,
        request: &ConnectorSearchRequest,
    ) -> Option<MessageResult> {
        let timestamp = parse_epoch_secs(&raw.ts)?;
        let message_type = classify(raw);
        let sender = Sender {
            name: raw
                .username
                .clone()
                .or_else(|| raw.user.clone())
                .unwrap_or_default(),
            id: raw.user.clone().unwrap_or_default(),
            email: None,
            avatar: None,
        };

        // oldest/latest already bounded the window server-side.
        if !message_passes(
            &raw.text,
            &sender,
            message_type,
            timestamp,
            &request.query,
            &request.filters,
            true,
        ) {
            return None;
        }

        let attachments = raw
            .files
            .iter()
            .map(|file| Attachment {
                name: file.name.clone(),
                mime_type: Some(file.mimetype.clone()),
                size: Some(file.size),
                url: file.url_private.clone(),
            })
            .collect();

        Some(MessageResult {
            id: raw.ts.clone(),
            platform: Platform::Slack,
            sender,
            content: raw.text.clone(),
            snippet: MessageResult::snippet_of(&raw.text),
            timestamp,
            channel: if channel.name.is_empty() {
                channel.id.clone()
            } else {
                format!("#{}", channel.name)
            },
            link: format!(
                "https://{}.slack.com/archives/{}/p{}",
                self.team_domain,
                channel.id,
                raw.ts.replace('.', "")
            ),
            message_type,
            attachments,
            metadata: raw
                .subtype
                .as_ref()
                .map(|subtype| serde_json::json!({ "subtype": subtype })),
            account_id: None,
        })
    }
}

fn classify(raw: &SlackMessage) -> MessageType {
    if let Some(file) = raw.files.first() {
        if file.mimetype.starts_with("image/") {
            return MessageType::Image;
        }
        return MessageType::File;
    }
    if raw.subtype.as_deref().is_some_and(|s| s != "bot_message") {
        return MessageType::Other;
    }
    MessageType::Text
}

#[async_trait]
impl Connector for SlackConnector {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    async fn authenticate(&self, code: &str) -> AuthResult {
        self.auth.authenticate(code).await
    }

    async fn refresh_token(&self, account_id: &AccountId) -> AuthResult {
        self.auth.refresh(account_id).await
    }

    async fn validate_connection(&self, account_id: &AccountId) -> bool {
        let Ok(token) = self.auth.access_token(account_id).await else {
            return false;
        };
        match self.api.auth_test(&token).await {
            Ok(identity) => identity.ok,
            Err(_) => false,
        }
    }

    async fn auth_state(&self, account_id: &AccountId) -> AuthState {
        self.auth.state(account_id).await
    }

    async fn search_account(
        &self,
        account_id: &AccountId,
        request: &ConnectorSearchRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressSink>,
    ) -> Result<Vec<MessageResult>> {
        emit(progress, SearchStage::ResolvingToken, 0, 0);
        let token = self.auth.access_token(account_id).await?;

        emit(progress, SearchStage::ListingContainers, 0, 0);
        let channels = self.list_all_channels(&token, cancel).await?;
        tracing::debug!(account = %account_id, channels = channels.len(), "enumerated slack channels");

        let mut results = Vec::new();
        let mut counters = (0usize, 0usize);
        let mut failed = 0usize;
        let mut last_error = None;

        for channel in &channels {
            if cancel.is_cancelled() {
                tracing::debug!(account = %account_id, "slack search cancelled, returning partial results");
                break;
            }
            match self
                .search_channel(&token, channel, request, cancel, progress, &mut counters)
                .await
            {
                Ok(mut matches) => results.append(&mut matches),
                Err(err @ (ConnectorError::AuthExpired | ConnectorError::ReauthRequired)) => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(channel = %channel.id, error = %err, "skipping channel");
                    failed += 1;
                    last_error = Some(err);
                }
            }
        }

        if !channels.is_empty() && failed == channels.len() {
            return Err(last_error.unwrap_or_else(|| {
                ConnectorError::invalid(Platform::Slack, "all channels failed")
            }));
        }

        emit(progress, SearchStage::Merging, counters.0, counters.1);
        sort_descending(&mut results);
        Ok(results)
    }

    async fn disconnect(&self) {
        self.auth.reset().await;
    }
}
