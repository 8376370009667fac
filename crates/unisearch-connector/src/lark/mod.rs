//! Lark (enterprise IM) connector.
//!
//! Search here is the most layered of the three platforms: the stored user
//! token alone is not enough, a short-lived tenant access token derived from
//! the app credentials must ride along on every IM call. Token resolution
//! failure fails the whole platform search; a single chat failing (missing
//! permission, deleted chat) is skipped.

pub mod api;

use crate::auth::{AuthResult, AuthState};
use crate::authenticator::Authenticator;
use crate::cancel::CancelToken;
use crate::connector::{Connector, sort_descending};
use crate::error::{ConnectorError, Result};
use crate::filter::message_passes;
use crate::model::{AccountId, MessageResult, MessageType, Platform, Sender};
use crate::progress::{ProgressSink, SearchStage, emit};
use crate::request::ConnectorSearchRequest;
use crate::time::parse_epoch_ms;
use api::{LarkApi, LarkChat, LarkMessage};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pages fetched per chat before giving up on exhaustion.
const DEFAULT_PAGE_CAP: usize = 10;

/// Connector for Lark/Feishu.
pub struct LarkConnector {
    api: Arc<dyn LarkApi>,
    auth: Authenticator,
    app_id: String,
    app_secret: String,
    page_cap: usize,
    tenant: RwLock<Option<(String, DateTime<Utc>)>>,
}

impl LarkConnector {
    /// Creates a connector over the given API client and authenticator.
    #[must_use]
    pub fn new(
        api: Arc<dyn LarkApi>,
        auth: Authenticator,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            api,
            auth,
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            page_cap: DEFAULT_PAGE_CAP,
            tenant: RwLock::new(None),
        }
    }

    /// Overrides the per-chat page cap.
    #[must_use]
    pub const fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap;
        self
    }

    /// Returns a valid tenant token, deriving a fresh one when the cached
    /// token is absent or near expiry.
    async fn tenant_token(&self) -> Result<String> {
        if let Some((token, expires_at)) = self.tenant.read().await.clone()
            && Utc::now() + Duration::seconds(60) < expires_at
        {
            return Ok(token);
        }

        let fresh = self
            .api
            .tenant_access_token(&self.app_id, &self.app_secret)
            .await?;
        let expires_at = Utc::now() + Duration::seconds(fresh.expires_in.max(0));
        *self.tenant.write().await = Some((fresh.token.clone(), expires_at));
        Ok(fresh.token)
    }

    /// Pages through the chat listing until `has_more` is false.
    async fn list_all_chats(
        &self,
        tenant_token: &str,
        user_token: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<LarkChat>> {
        let mut chats = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let page = self
                .api
                .list_chats(tenant_token, user_token, page_token.as_deref())
                .await?;
            chats.extend(page.items);
            if !page.has_more {
                break;
            }
            match page.page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(chats)
    }

    /// Paginates one chat's messages, filtering and normalizing as it goes.
    #[allow(clippy::too_many_arguments)]
    async fn search_chat(
        &self,
        tenant_token: &str,
        user_token: &str,
        chat: &LarkChat,
        request: &ConnectorSearchRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressSink>,
        counters: &mut (usize, usize),
    ) -> Result<Vec<MessageResult>> {
        let range = request.filters.date_range.unwrap_or_default();
        let start_time = range.after.map(|t| t.timestamp());
        let end_time = range.before.map(|t| t.timestamp());

        let mut matches = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if cancel.is_cancelled() || matches.len() >= request.max_results {
                break;
            }
            let page = self
                .api
                .list_messages(
                    tenant_token,
                    user_token,
                    &chat.chat_id,
                    page_token.as_deref(),
                    start_time,
                    end_time,
                )
                .await?;

            for raw in &page.items {
                counters.0 += 1;
                if let Some(message) = self.normalize(raw, chat, request) {
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
            match page.page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(matches)
    }

    /// Converts one raw message into a [`MessageResult`], or `None` when it
    /// does not pass the query/filters.
    fn normalize(
        &self,
        raw: &LarkMessage,
        chat: &LarkChat,
        request: &ConnectorSearchRequest,
    ) -> Option<MessageResult> {
        let timestamp = parse_epoch_ms(&raw.create_time)?;
        let content = extract_text(&raw.body.content, &raw.msg_type);
        let message_type = classify(&raw.msg_type);
        let sender = Sender {
            name: raw.sender.id.clone(),
            id: raw.sender.id.clone(),
            email: None,
            avatar: None,
        };

        // The time range already went to the server via start/end_time.
        if !message_passes(
            &content,
            &sender,
            message_type,
            timestamp,
            &request.query,
            &request.filters,
            true,
        ) {
            return None;
        }

        Some(MessageResult {
            id: raw.message_id.clone(),
            platform: Platform::Lark,
            sender,
            snippet: MessageResult::snippet_of(&content),
            content,
            timestamp,
            channel: if chat.name.is_empty() {
                chat.chat_id.clone()
            } else {
                chat.name.clone()
            },
            link: format!(
                "https://applink.larksuite.com/client/message/link/open?message_id={}",
                raw.message_id
            ),
            message_type,
            attachments: Vec::new(),
            metadata: Some(serde_json::json!({
                "chat_id": raw.chat_id,
                "msg_type": raw.msg_type,
            })),
            account_id: None,
        })
    }
}

/// Unwraps Lark's JSON-encoded message body into plain text.
fn extract_text(content: &str, msg_type: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
            return text.to_string();
        }
        if msg_type == "file" || msg_type == "media" {
            if let Some(name) = value.get("file_name").and_then(|n| n.as_str()) {
                return name.to_string();
            }
        }
    }
    content.to_string()
}

fn classify(msg_type: &str) -> MessageType {
    match msg_type {
        "text" | "post" => MessageType::Text,
        "image" => MessageType::Image,
        "file" | "media" => MessageType::File,
        _ => MessageType::Other,
    }
}

#[async_trait]
impl Connector for LarkConnector {
    fn platform(&self) -> Platform {
        Platform::Lark
    }

    async fn authenticate(&self, code: &str) -> AuthResult {
        self.auth.authenticate(code).await
    }

    async fn refresh_token(&self, account_id: &AccountId) -> AuthResult {
        self.auth.refresh(account_id).await
    }

    async fn validate_connection(&self, account_id: &AccountId) -> bool {
        let Ok(user_token) = self.auth.access_token(account_id).await else {
            return false;
        };
        self.api.user_profile(&user_token).await.is_ok()
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
        let user_token = self.auth.access_token(account_id).await?;
        let tenant_token = self.tenant_token().await?;

        emit(progress, SearchStage::ListingContainers, 0, 0);
        let chats = self
            .list_all_chats(&tenant_token, &user_token, cancel)
            .await?;
        tracing::debug!(account = %account_id, chats = chats.len(), "enumerated lark chats");

        let mut results = Vec::new();
        let mut counters = (0usize, 0usize);
        let mut failed = 0usize;
        let mut last_error = None;

        for chat in &chats {
            if cancel.is_cancelled() {
                tracing::debug!(account = %account_id, "lark search cancelled, returning partial results");
                break;
            }
            match self
                .search_chat(
                    &tenant_token,
                    &user_token,
                    chat,
                    request,
                    cancel,
                    progress,
                    &mut counters,
                )
                .await
            {
                Ok(mut matches) => results.append(&mut matches),
                // Token death affects every remaining chat; bail out so the
                // caller can refresh and retry.
                Err(err @ (ConnectorError::AuthExpired | ConnectorError::ReauthRequired)) => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(chat = %chat.chat_id, error = %err, "skipping chat");
                    failed += 1;
                    last_error = Some(err);
                }
            }
        }

        if !chats.is_empty() && failed == chats.len() {
            return Err(last_error.unwrap_or_else(|| {
                ConnectorError::invalid(Platform::Lark, "all chats failed")
            }));
        }

        emit(progress, SearchStage::Merging, counters.0, counters.1);
        sort_descending(&mut results);
        Ok(results)
    }

    async fn disconnect(&self) {
        *self.tenant.write().await = None;
        self.auth.reset().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use api::{ChatPage, LarkBody, LarkProfile, LarkSenderId, MessagePage, TenantToken};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use unisearch_oauth::{CredentialStore, MemoryCredentialStore, Token, TokenProvider};

    fn text_message(id: &str, chat: &str, text: &str, epoch_ms: i64) -> LarkMessage {
        LarkMessage {
            message_id: id.to_string(),
            msg_type: "text".to_string(),
            create_time: epoch_ms.to_string(),
            sender: LarkSenderId {
                id: "ou_sender".to_string(),
                sender_type: "user".to_string(),
            },
            body: LarkBody {
                content: serde_json::json!({ "text": text }).to_string(),
            },
            chat_id: chat.to_string(),
        }
    }

    /// Scripted API: chats plus per-chat message pages.
    struct FakeLark {
        chats: Vec<LarkChat>,
        /// chat_id -> pages of messages, or an error for the whole chat.
        pages: Vec<(String, std::result::Result<Vec<Vec<LarkMessage>>, ConnectorError>)>,
        tenant_fails: bool,
        page_requests: AtomicUsize,
        seen_windows: Mutex<Vec<(Option<i64>, Option<i64>)>>,
    }

    impl FakeLark {
        fn new(
            chats: Vec<LarkChat>,
            pages: Vec<(String, std::result::Result<Vec<Vec<LarkMessage>>, ConnectorError>)>,
        ) -> Self {
            Self {
                chats,
                pages,
                tenant_fails: false,
                page_requests: AtomicUsize::new(0),
                seen_windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LarkApi for FakeLark {
        async fn tenant_access_token(
            &self,
            _app_id: &str,
            _app_secret: &str,
        ) -> Result<TenantToken> {
            if self.tenant_fails {
                return Err(ConnectorError::Transient("tenant endpoint down".to_string()));
            }
            Ok(TenantToken {
                token: "tenant-token".to_string(),
                expires_in: 7200,
            })
        }

        async fn list_chats(
            &self,
            _tenant_token: &str,
            _user_token: &str,
            _page_token: Option<&str>,
        ) -> Result<ChatPage> {
            Ok(ChatPage {
                items: self.chats.clone(),
                page_token: None,
                has_more: false,
            })
        }

        async fn list_messages(
            &self,
            _tenant_token: &str,
            _user_token: &str,
            chat_id: &str,
            page_token: Option<&str>,
            start_time: Option<i64>,
            end_time: Option<i64>,
        ) -> Result<MessagePage> {
            self.page_requests.fetch_add(1, Ordering::SeqCst);
            self.seen_windows
                .lock()
                .unwrap()
                .push((start_time, end_time));

            let entry = self.pages.iter().find(|(id, _)| id == chat_id).unwrap();
            let pages = match &entry.1 {
                Ok(pages) => pages,
                Err(ConnectorError::Permission { container }) => {
                    return Err(ConnectorError::Permission {
                        container: container.clone(),
                    });
                }
                Err(_) => return Err(ConnectorError::Transient("scripted".to_string())),
            };

            let index = page_token.map_or(0, |t| t.parse::<usize>().unwrap());
            let has_more = index + 1 < pages.len();
            Ok(MessagePage {
                items: pages[index].clone(),
                page_token: has_more.then(|| (index + 1).to_string()),
                has_more,
            })
        }

        async fn user_profile(&self, _user_token: &str) -> Result<LarkProfile> {
            Ok(LarkProfile {
                open_id: "ou_me".to_string(),
                name: "Me".to_string(),
            })
        }
    }

    struct UnusedProvider;

    #[async_trait]
    impl TokenProvider for UnusedProvider {
        async fn exchange_code(
            &self,
            _code: &str,
        ) -> unisearch_oauth::Result<unisearch_oauth::Exchanged> {
            Err(unisearch_oauth::Error::InvalidResponse("unused".to_string()))
        }

        async fn refresh(&self, _refresh_token: &str) -> unisearch_oauth::Result<Token> {
            Err(unisearch_oauth::Error::InvalidResponse("unused".to_string()))
        }
    }

    async fn connector(api: FakeLark) -> LarkConnector {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("lark:acc1", Token::new("user-token"))
            .await
            .unwrap();
        let auth = Authenticator::new(
            Platform::Lark,
            Arc::new(UnusedProvider),
            store as Arc<dyn CredentialStore>,
        );
        LarkConnector::new(Arc::new(api), auth, "app-id", "app-secret")
    }

    fn chat(id: &str, name: &str) -> LarkChat {
        LarkChat {
            chat_id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn paginates_to_exhaustion() {
        // 3 pages: has_more on 1-2, false on 3; exactly 3 page requests.
        let api = FakeLark::new(
            vec![chat("oc_1", "general")],
            vec![(
                "oc_1".to_string(),
                Ok(vec![
                    vec![text_message("m1", "oc_1", "report one", 1_706_000_000_000)],
                    vec![text_message("m2", "oc_1", "report two", 1_706_000_100_000)],
                    vec![text_message("m3", "oc_1", "report three", 1_706_000_200_000)],
                ]),
            )],
        );
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("report", vec![AccountId::new("lark:acc1")]);

        let results = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let ids: Vec<_> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m2", "m1"]);
    }

    #[tokio::test]
    async fn page_request_count_matches_pages() {
        let api = Arc::new(FakeLark::new(
            vec![chat("oc_1", "general")],
            vec![(
                "oc_1".to_string(),
                Ok(vec![
                    vec![text_message("m1", "oc_1", "x", 1)],
                    vec![text_message("m2", "oc_1", "x", 2)],
                    vec![text_message("m3", "oc_1", "x", 3)],
                ]),
            )],
        ));
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("lark:acc1", Token::new("user-token"))
            .await
            .unwrap();
        let auth = Authenticator::new(
            Platform::Lark,
            Arc::new(UnusedProvider),
            store as Arc<dyn CredentialStore>,
        );
        let connector =
            LarkConnector::new(Arc::clone(&api) as Arc<dyn LarkApi>, auth, "id", "secret");

        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")]);
        let results = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(api.page_requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn tenant_token_failure_fails_platform() {
        let mut api = FakeLark::new(vec![chat("oc_1", "general")], vec![]);
        api.tenant_fails = true;
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")]);

        let result = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await;
        assert!(matches!(result, Err(ConnectorError::Transient(_))));
    }

    #[tokio::test]
    async fn failed_chat_is_skipped_others_survive() {
        let api = FakeLark::new(
            vec![chat("oc_1", "general"), chat("oc_2", "secret"), chat("oc_3", "eng")],
            vec![
                (
                    "oc_1".to_string(),
                    Ok(vec![vec![text_message("m1", "oc_1", "order-12345", 1_000)]]),
                ),
                (
                    "oc_2".to_string(),
                    Err(ConnectorError::Permission {
                        container: "oc_2".to_string(),
                    }),
                ),
                (
                    "oc_3".to_string(),
                    Ok(vec![vec![text_message("m2", "oc_3", "ORDER-12345 ack", 2_000)]]),
                ),
            ],
        );
        let connector = connector(api).await;
        let request =
            ConnectorSearchRequest::new("order-12345", vec![AccountId::new("lark:acc1")]);

        let results = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();

        // Two matching messages in two different chats, case-insensitive.
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|m| m.platform == Platform::Lark));
        assert!(
            results
                .iter()
                .all(|m| m.content.to_lowercase().contains("order-12345"))
        );
    }

    #[tokio::test]
    async fn all_chats_failing_fails_the_account() {
        let api = FakeLark::new(
            vec![chat("oc_1", "a"), chat("oc_2", "b")],
            vec![
                (
                    "oc_1".to_string(),
                    Err(ConnectorError::Permission {
                        container: "oc_1".to_string(),
                    }),
                ),
                (
                    "oc_2".to_string(),
                    Err(ConnectorError::Permission {
                        container: "oc_2".to_string(),
                    }),
                ),
            ],
        );
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")]);

        let result = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_search_returns_partial_without_error() {
        let api = FakeLark::new(
            vec![chat("oc_1", "a"), chat("oc_2", "b")],
            vec![
                (
                    "oc_1".to_string(),
                    Ok(vec![vec![text_message("m1", "oc_1", "x", 1_000)]]),
                ),
                (
                    "oc_2".to_string(),
                    Ok(vec![vec![text_message("m2", "oc_2", "x", 2_000)]]),
                ),
            ],
        );
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = connector
            .search_account(&AccountId::new("lark:acc1"), &request, &cancel, None)
            .await
            .unwrap();
        // Cancelled before any chat was processed: empty, but not an error.
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_sorted_descending_and_content_unwrapped() {
        let api = FakeLark::new(
            vec![chat("oc_1", "general")],
            vec![(
                "oc_1".to_string(),
                Ok(vec![vec![
                    text_message("old", "oc_1", "hello old", 1_706_000_000_000),
                    text_message("new", "oc_1", "hello new", 1_706_000_300_000),
                ]]),
            )],
        );
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("hello", vec![AccountId::new("lark:acc1")]);

        let results = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].id, "new");
        assert_eq!(results[1].id, "old");
        assert_eq!(results[0].content, "hello new");
        assert_eq!(results[0].channel, "general");
    }

    #[tokio::test]
    async fn date_range_is_pushed_server_side() {
        let api = Arc::new(FakeLark::new(
            vec![chat("oc_1", "general")],
            vec![("oc_1".to_string(), Ok(vec![vec![]]))],
        ));
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("lark:acc1", Token::new("user-token"))
            .await
            .unwrap();
        let auth = Authenticator::new(
            Platform::Lark,
            Arc::new(UnusedProvider),
            store as Arc<dyn CredentialStore>,
        );
        let connector =
            LarkConnector::new(Arc::clone(&api) as Arc<dyn LarkApi>, auth, "id", "secret");

        use chrono::TimeZone;
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")])
            .with_filters(crate::request::SearchFilters {
                date_range: Some(crate::request::DateRange {
                    after: Some(after),
                    before: None,
                }),
                ..Default::default()
            });

        connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();

        let windows = api.seen_windows.lock().unwrap();
        assert_eq!(windows[0].0, Some(after.timestamp()));
        assert_eq!(windows[0].1, None);
    }

    #[tokio::test]
    async fn max_results_caps_collection() {
        let many: Vec<LarkMessage> = (0..10)
            .map(|i| text_message(&format!("m{i}"), "oc_1", "x", 1_000 + i))
            .collect();
        let api = FakeLark::new(
            vec![chat("oc_1", "general")],
            vec![("oc_1".to_string(), Ok(vec![many]))],
        );
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("x", vec![AccountId::new("lark:acc1")])
            .with_max_results(3);

        let results = connector
            .search_account(
                &AccountId::new("lark:acc1"),
                &request,
                &CancelToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn extract_text_variants() {
        assert_eq!(extract_text("{\"text\":\"hi\"}", "text"), "hi");
        assert_eq!(
            extract_text("{\"file_name\":\"report.pdf\"}", "file"),
            "report.pdf"
        );
        assert_eq!(extract_text("not json", "text"), "not json");
    }

    #[test]
    fn classify_msg_types() {
        assert_eq!(classify("text"), MessageType::Text);
        assert_eq!(classify("image"), MessageType::Image);
        assert_eq!(classify("file"), MessageType::File);
        assert_eq!(classify("sticker"), MessageType::Other);
    }
}
