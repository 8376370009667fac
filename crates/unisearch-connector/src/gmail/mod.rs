//! Gmail (email) connector.
//!
//! The keyword, sender and date filters are compiled into the native `q`
//! expression, so the server returns only matching ids and no client-side
//! re-filtering of the keyword is needed. Labels play the container role;
//! each listed id is hydrated with one metadata fetch.

pub mod api;

use crate::auth::{AuthResult, AuthState};
use crate::authenticator::Authenticator;
use crate::cancel::CancelToken;
use crate::connector::{Connector, sort_descending};
use crate::error::{ConnectorError, Result};
use crate::model::{AccountId, Attachment, MessageResult, MessageType, Platform, Sender};
use crate::progress::{ProgressSink, SearchStage, emit};
use crate::request::{ConnectorSearchRequest, SearchFilters};
use crate::time::parse_epoch_ms;
use api::{GmailApi, GmailLabel, GmailMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Pages fetched per label before giving up on exhaustion.
const DEFAULT_PAGE_CAP: usize = 10;

/// Labels that only duplicate messages visible elsewhere.
const SKIPPED_LABELS: [&str; 4] = ["SPAM", "TRASH", "DRAFT", "CHAT"];

/// Connector for Gmail.
pub struct GmailConnector {
    api: Arc<dyn GmailApi>,
    auth: Authenticator,
    page_cap: usize,
}

impl GmailConnector {
    /// Creates a connector over the given API client and authenticator.
    #[must_use]
    pub fn new(api: Arc<dyn GmailApi>, auth: Authenticator) -> Self {
        Self {
            api,
            auth,
            page_cap: DEFAULT_PAGE_CAP,
        }
    }

    /// Overrides the per-label page cap.
    #[must_use]
    pub const fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap;
        self
    }

    /// Paginates one label's listing, hydrating each id as it goes.
    #[allow(clippy::too_many_arguments)]
    async fn search_label(
        &self,
        token: &str,
        label: &GmailLabel,
        q: &str,
        request: &ConnectorSearchRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressSink>,
        counters: &mut (usize, usize),
    ) -> Result<Vec<MessageResult>> {
        let mut matches = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if cancel.is_cancelled() || matches.len() >= request.max_results {
                break;
            }
            let page = self
                .api
                .list_message_ids(token, &label.id, q, page_token.as_deref())
                .await?;

            for entry in &page.messages {
                if cancel.is_cancelled() || matches.len() >= request.max_results {
                    break;
                }
                counters.0 += 1;
                match self.api.get_message(token, &entry.id).await {
                    Ok(raw) => {
                        if let Some(message) = normalize(&raw, label, request) {
                            counters.1 += 1;
                            matches.push(message);
                        }
                    }
                    Err(err @ (ConnectorError::AuthExpired | ConnectorError::ReauthRequired)) => {
                        return Err(err);
                    }
                    // A single unreadable message does not sink the label.
                    Err(err) => {
                        tracing::warn!(message = %entry.id, error = %err, "skipping message");
                    }
                }
            }
            emit(progress, SearchStage::FetchingMessages, counters.0, counters.1);

            pages += 1;
            if pages >= self.page_cap {
                break;
            }
            match page.next_page_token {
                Some(cursor) if !cursor.is_empty() => page_token = Some(cursor),
                _ => break,
            }
        }

        Ok(matches)
    }
}

/// Compiles the query and filters into Gmail's `q` expression.
///
/// `after:`/`before:` take epoch seconds; `before:` is exclusive upstream so
/// the bound is pushed one second past the inclusive edge.
fn build_query(query: &str, filters: &SearchFilters) -> String {
    let mut parts = Vec::new();
    let trimmed = query.trim();
    if !trimmed.is_empty() {
        parts.push(format!("\"{trimmed}\""));
    }
    if let Some(sender) = &filters.sender {
        parts.push(format!("from:{sender}"));
    }
    if let Some(range) = &filters.date_range {
        if let Some(after) = range.after {
            parts.push(format!("after:{}", after.timestamp()));
        }
        if let Some(before) = range.before {
            parts.push(format!("before:{}", before.timestamp() + 1));
        }
    }
    parts.join(" ")
}

/// Converts a hydrated message into a [`MessageResult`], or `None` when the
/// residual client-side filters reject it.
fn normalize(
    raw: &GmailMessage,
    label: &GmailLabel,
    request: &ConnectorSearchRequest,
) -> Option<MessageResult> {
    let timestamp = parse_epoch_ms(&raw.internal_date)?;
    let sender = parse_from(raw.header("From").unwrap_or_default());
    let subject = raw.header("Subject").unwrap_or_default();
    let content = if subject.is_empty() {
        raw.snippet.clone()
    } else if raw.snippet.is_empty() {
        subject.to_string()
    } else {
        format!("{subject}: {}", raw.snippet)
    };
    let (message_type, attachments) = classify(raw);

    // Keyword, sender and date all went to the server via `q`; only the
    // message-type filter is left to check here.
    if request
        .filters
        .message_type
        .is_some_and(|wanted| wanted != message_type)
    {
        return None;
    }

    Some(MessageResult {
        id: raw.id.clone(),
        platform: Platform::Gmail,
        sender,
        snippet: MessageResult::snippet_of(&content),
        content,
        timestamp,
        channel: if label.name.is_empty() {
            label.id.clone()
        } else {
            label.name.clone()
        },
        link: format!("https://mail.google.com/mail/u/0/#all/{}", raw.id),
        message_type,
        attachments,
        metadata: Some(serde_json::json!({
            "thread_id": raw.thread_id,
            "label_id": label.id,
        })),
        account_id: None,
    })
}

/// Splits an RFC 5322 `From` header into display name and address.
fn parse_from(value: &str) -> Sender {
    let value = value.trim();
    if let Some(open) = value.rfind('<')
        && let Some(close) = value.rfind('>')
        && open < close
    {
        let email = value[open + 1..close].trim().to_string();
        let name = value[..open].trim().trim_matches('"').to_string();
        return Sender {
            name: if name.is_empty() { email.clone() } else { name },
            id: email.clone(),
            email: Some(email),
            avatar: None,
        };
    }
    Sender {
        name: value.to_string(),
        id: value.to_string(),
        email: if value.contains('@') {
            Some(value.to_string())
        } else {
            None
        },
        avatar: None,
    }
}

/// Infers the message kind from the top-level MIME part.
fn classify(raw: &GmailMessage) -> (MessageType, Vec<Attachment>) {
    let payload = &raw.payload;
    if !payload.filename.is_empty() {
        let attachment = Attachment {
            name: payload.filename.clone(),
            mime_type: Some(payload.mime_type.clone()),
            size: None,
            url: None,
        };
        let kind = if payload.mime_type.starts_with("image/") {
            MessageType::Image
        } else {
            MessageType::File
        };
        return (kind, vec![attachment]);
    }
    if payload.mime_type == "multipart/mixed" {
        // Mixed multiparts carry attachments the metadata format hides.
        return (MessageType::File, Vec::new());
    }
    (MessageType::Text, Vec::new())
}

#[async_trait]
impl Connector for GmailConnector {
    fn platform(&self) -> Platform {
        Platform::Gmail
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
        self.api.profile(&token).await.is_ok()
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
        let labels: Vec<GmailLabel> = self
            .api
            .list_labels(&token)
            .await?
            .labels
            .into_iter()
            .filter(|l| !SKIPPED_LABELS.contains(&l.id.as_str()))
            .collect();
        tracing::debug!(account = %account_id, labels = labels.len(), "enumerated gmail labels");

        let q = build_query(&request.query, &request.filters);
        let mut results = Vec::new();
        let mut counters = (0usize, 0usize);
        let mut failed = 0usize;
        let mut last_error = None;
        let mut seen = std::collections::HashSet::new();

        for label in &labels {
            if cancel.is_cancelled() {
                tracing::debug!(account = %account_id, "gmail search cancelled, returning partial results");
                break;
            }
            match self
                .search_label(&token, label, &q, request, cancel, progress, &mut counters)
                .await
            {
                Ok(matches) => {
                    // The same message can sit under several labels.
                    for message in matches {
                        if seen.insert(message.id.clone()) {
                            results.push(message);
                        }
                    }
                }
                Err(err @ (ConnectorError::AuthExpired | ConnectorError::ReauthRequired)) => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(label = %label.id, error = %err, "skipping label");
                    failed += 1;
                    last_error = Some(err);
                }
            }
        }

        if !labels.is_empty() && failed == labels.len() {
            return Err(last_error.unwrap_or_else(|| {
                ConnectorError::invalid(Platform::Gmail, "all labels failed")
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use api::{GmailHeader, GmailPayload, GmailProfile, LabelList, MessageIdPage};
    use crate::request::DateRange;
    use chrono::TimeZone;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use unisearch_oauth::{CredentialStore, MemoryCredentialStore, Token, TokenProvider};

    fn label(id: &str, name: &str) -> GmailLabel {
        GmailLabel {
            id: id.to_string(),
            name: name.to_string(),
            label_type: "system".to_string(),
        }
    }

    fn message(id: &str, from: &str, subject: &str, snippet: &str, epoch_ms: i64) -> GmailMessage {
        GmailMessage {
            id: id.to_string(),
            thread_id: format!("t-{id}"),
            snippet: snippet.to_string(),
            internal_date: epoch_ms.to_string(),
            payload: GmailPayload {
                headers: vec![
                    GmailHeader {
                        name: "From".to_string(),
                        value: from.to_string(),
                    },
                    GmailHeader {
                        name: "Subject".to_string(),
                        value: subject.to_string(),
                    },
                ],
                mime_type: "text/plain".to_string(),
                filename: String::new(),
            },
        }
    }

    /// Scripted API: labels, per-label id pages, and hydrated messages.
    struct FakeGmail {
        labels: Vec<GmailLabel>,
        /// label_id -> pages of ids.
        pages: Vec<(String, Vec<Vec<String>>)>,
        messages: Vec<GmailMessage>,
        list_calls: AtomicUsize,
        seen_queries: Mutex<Vec<String>>,
    }

    impl FakeGmail {
        fn new(
            labels: Vec<GmailLabel>,
            pages: Vec<(String, Vec<Vec<String>>)>,
            messages: Vec<GmailMessage>,
        ) -> Self {
            Self {
                labels,
                pages,
                messages,
                list_calls: AtomicUsize::new(0),
                seen_queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GmailApi for FakeGmail {
        async fn list_labels(&self, _token: &str) -> Result<LabelList> {
            Ok(LabelList {
                labels: self.labels.clone(),
            })
        }

        async fn list_message_ids(
            &self,
            _token: &str,
            label_id: &str,
            q: &str,
            page_token: Option<&str>,
        ) -> Result<MessageIdPage> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.seen_queries.lock().unwrap().push(q.to_string());

            let Some((_, pages)) = self.pages.iter().find(|(id, _)| id == label_id) else {
                return Err(ConnectorError::Permission {
                    container: label_id.to_string(),
                });
            };
            let index = page_token.map_or(0, |t| t.parse::<usize>().unwrap());
            let has_more = index + 1 < pages.len();
            Ok(MessageIdPage {
                messages: pages[index]
                    .iter()
                    .map(|id| api::GmailMessageRef { id: id.clone() })
                    .collect(),
                next_page_token: has_more.then(|| (index + 1).to_string()),
            })
        }

        async fn get_message(&self, _token: &str, id: &str) -> Result<GmailMessage> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| ConnectorError::invalid(Platform::Gmail, format!("missing {id}")))
        }

        async fn profile(&self, _token: &str) -> Result<GmailProfile> {
            Ok(GmailProfile {
                email_address: "me@example.com".to_string(),
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

    async fn connector(api: Arc<FakeGmail>) -> GmailConnector {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("gmail:acc1", Token::new("gmail-token"))
            .await
            .unwrap();
        let auth = Authenticator::new(
            Platform::Gmail,
            Arc::new(UnusedProvider),
            store as Arc<dyn CredentialStore>,
        );
        GmailConnector::new(api as Arc<dyn GmailApi>, auth)
    }

    fn account() -> AccountId {
        AccountId::new("gmail:acc1")
    }

    #[tokio::test]
    async fn paginates_with_next_page_token() {
        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox")],
            vec![(
                "INBOX".to_string(),
                vec![
                    vec!["m1".to_string()],
                    vec!["m2".to_string()],
                    vec!["m3".to_string()],
                ],
            )],
            vec![
                message("m1", "a@x.com", "report", "one", 1_706_000_000_000),
                message("m2", "a@x.com", "report", "two", 1_706_000_100_000),
                message("m3", "a@x.com", "report", "three", 1_706_000_200_000),
            ],
        ));
        let connector = connector(Arc::clone(&api)).await;
        let request = ConnectorSearchRequest::new("report", vec![account()]);

        let results = connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 3);
        let ids: Vec<_> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m2", "m1"]);
    }

    #[tokio::test]
    async fn filters_are_compiled_into_q() {
        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox")],
            vec![("INBOX".to_string(), vec![vec![]])],
            vec![],
        ));
        let connector = connector(Arc::clone(&api)).await;

        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let request = ConnectorSearchRequest::new("order-12345", vec![account()]).with_filters(
            SearchFilters {
                sender: Some("shop@example.com".to_string()),
                date_range: Some(DateRange {
                    after: Some(after),
                    before: Some(before),
                }),
                ..Default::default()
            },
        );

        connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();

        let queries = api.seen_queries.lock().unwrap();
        let q = &queries[0];
        assert!(q.contains("\"order-12345\""));
        assert!(q.contains("from:shop@example.com"));
        assert!(q.contains(&format!("after:{}", after.timestamp())));
        assert!(q.contains(&format!("before:{}", before.timestamp() + 1)));
    }

    #[tokio::test]
    async fn duplicate_ids_across_labels_collapse() {
        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox"), label("IMPORTANT", "Important")],
            vec![
                ("INBOX".to_string(), vec![vec!["m1".to_string()]]),
                ("IMPORTANT".to_string(), vec![vec!["m1".to_string()]]),
            ],
            vec![message("m1", "a@x.com", "hi", "hi there", 1_000)],
        ));
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("hi", vec![account()]);

        let results = connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn spam_and_trash_labels_are_not_searched() {
        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox"), label("SPAM", "Spam"), label("TRASH", "Trash")],
            vec![("INBOX".to_string(), vec![vec![]])],
            vec![],
        ));
        let connector = connector(Arc::clone(&api)).await;
        let request = ConnectorSearchRequest::new("x", vec![account()]);

        connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();
        // Only INBOX was listed; SPAM/TRASH would have errored in the fake.
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreadable_message_is_skipped() {
        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox")],
            vec![(
                "INBOX".to_string(),
                vec![vec!["gone".to_string(), "m1".to_string()]],
            )],
            vec![message("m1", "a@x.com", "hi", "hi there", 1_000)],
        ));
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("hi", vec![account()]);

        let results = connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[tokio::test]
    async fn auth_expiry_mid_label_propagates() {
        struct ExpiredGmail;

        #[async_trait]
        impl GmailApi for ExpiredGmail {
            async fn list_labels(&self, _token: &str) -> Result<LabelList> {
                Ok(LabelList {
                    labels: vec![GmailLabel {
                        id: "INBOX".to_string(),
                        name: "Inbox".to_string(),
                        label_type: "system".to_string(),
                    }],
                })
            }
            async fn list_message_ids(
                &self,
                _token: &str,
                _label_id: &str,
                _q: &str,
                _page_token: Option<&str>,
            ) -> Result<MessageIdPage> {
                Err(ConnectorError::AuthExpired)
            }
            async fn get_message(&self, _token: &str, _id: &str) -> Result<GmailMessage> {
                Err(ConnectorError::AuthExpired)
            }
            async fn profile(&self, _token: &str) -> Result<GmailProfile> {
                Err(ConnectorError::AuthExpired)
            }
        }

        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("gmail:acc1", Token::new("gmail-token"))
            .await
            .unwrap();
        let auth = Authenticator::new(
            Platform::Gmail,
            Arc::new(UnusedProvider),
            store as Arc<dyn CredentialStore>,
        );
        let connector = GmailConnector::new(Arc::new(ExpiredGmail), auth);
        let request = ConnectorSearchRequest::new("x", vec![account()]);

        let result = connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await;
        assert!(matches!(result, Err(ConnectorError::AuthExpired)));
    }

    #[tokio::test]
    async fn message_type_filter_applies_client_side() {
        let mut file_message = message("f1", "a@x.com", "doc", "attached", 2_000);
        file_message.payload.filename = "q4.pdf".to_string();
        file_message.payload.mime_type = "application/pdf".to_string();

        let api = Arc::new(FakeGmail::new(
            vec![label("INBOX", "Inbox")],
            vec![(
                "INBOX".to_string(),
                vec![vec!["m1".to_string(), "f1".to_string()]],
            )],
            vec![message("m1", "a@x.com", "doc", "plain", 1_000), file_message],
        ));
        let connector = connector(api).await;
        let request = ConnectorSearchRequest::new("doc", vec![account()]).with_filters(
            SearchFilters {
                message_type: Some(MessageType::File),
                ..Default::default()
            },
        );

        let results = connector
            .search_account(&account(), &request, &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "f1");
        assert_eq!(results[0].attachments[0].name, "q4.pdf");
    }

    #[tokio::test]
    async fn validate_connection_probes_profile() {
        let api = Arc::new(FakeGmail::new(vec![], vec![], vec![]));
        let connector = connector(api).await;
        assert!(connector.validate_connection(&account()).await);
        assert!(
            !connector
                .validate_connection(&AccountId::new("gmail:other"))
                .await
        );
    }

    #[test]
    fn from_header_variants() {
        let s = parse_from("Shop Notifications <shop@example.com>");
        assert_eq!(s.name, "Shop Notifications");
        assert_eq!(s.email.as_deref(), Some("shop@example.com"));

        let bare = parse_from("shop@example.com");
        assert_eq!(bare.name, "shop@example.com");
        assert_eq!(bare.email.as_deref(), Some("shop@example.com"));

        let quoted = parse_from("\"Doe, Jane\" <jane@example.com>");
        assert_eq!(quoted.name, "Doe, Jane");
    }

    #[test]
    fn query_without_filters_is_just_the_phrase() {
        assert_eq!(build_query("order-12345", &SearchFilters::default()), "\"order-12345\"");
        assert_eq!(build_query("  ", &SearchFilters::default()), "");
    }
}
