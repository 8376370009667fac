//! The connector contract and the multi-account fan-out shared by all
//! platforms.

use crate::auth::{AuthResult, AuthState};
use crate::cancel::CancelToken;
use crate::error::{ConnectorError, Result};
use crate::model::{AccountId, MessageResult, Platform};
use crate::progress::ProgressSink;
use crate::request::ConnectorSearchRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Capability set every platform connector implements.
///
/// Connectors are shared behind `Arc<dyn Connector>` and must tolerate
/// concurrent calls; token and auth state live behind interior locks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The platform this connector serves.
    fn platform(&self) -> Platform;

    /// Exchanges an out-of-band authorization code for tokens, storing them
    /// under the authorizing user's account id. Never returns an error;
    /// failures are reported inside the [`AuthResult`].
    async fn authenticate(&self, code: &str) -> AuthResult;

    /// Refreshes the stored token for an account.
    ///
    /// A dead or missing refresh token yields `success: false` with
    /// `requires_reauth: true`; transient failures leave `requires_reauth`
    /// unset.
    async fn refresh_token(&self, account_id: &AccountId) -> AuthResult;

    /// Lightweight connectivity probe (current-user profile fetch).
    /// Returns false on any error, including network failure; never panics
    /// or errors.
    async fn validate_connection(&self, account_id: &AccountId) -> bool;

    /// Current auth state of an account on this connector.
    async fn auth_state(&self, account_id: &AccountId) -> AuthState;

    /// Runs the platform's search algorithm for a single account: resolve
    /// the working credential, enumerate containers, paginate each, filter,
    /// normalize. Returns results sorted timestamp-descending.
    ///
    /// # Errors
    ///
    /// Fails only when token resolution fails or every container fails;
    /// individual container failures are logged and skipped.
    async fn search_account(
        &self,
        account_id: &AccountId,
        request: &ConnectorSearchRequest,
        cancel: &CancelToken,
        progress: Option<&ProgressSink>,
    ) -> Result<Vec<MessageResult>>;

    /// Releases connector-held resources. Idempotent.
    async fn disconnect(&self);
}

/// Outcome of one platform dispatch across that platform's accounts.
#[derive(Debug, Default)]
pub struct ConnectorSearchOutcome {
    /// Merged results from all accounts that succeeded, sorted
    /// timestamp-descending.
    pub results: Vec<MessageResult>,
    /// Accounts that failed, with the error that stopped them.
    pub failures: Vec<(AccountId, ConnectorError)>,
    /// Number of accounts dispatched.
    pub attempted: usize,
}

impl ConnectorSearchOutcome {
    /// True when at least one account produced a result set (a platform is
    /// failed only when every account fails).
    #[must_use]
    pub fn any_succeeded(&self) -> bool {
        self.attempted > self.failures.len()
    }
}

/// Sorts results newest-first.
pub fn sort_descending(results: &mut [MessageResult]) {
    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Fans a platform sub-request out across its accounts concurrently and
/// collects successes and failures without letting one account's failure
/// cancel its siblings.
///
/// An account failing with [`ConnectorError::AuthExpired`] gets one internal
/// token refresh and a single retry before its failure is recorded;
/// [`ConnectorError::ReauthRequired`] is never retried.
pub async fn search_accounts(
    connector: Arc<dyn Connector>,
    request: Arc<ConnectorSearchRequest>,
    cancel: CancelToken,
    progress: Option<ProgressSink>,
) -> ConnectorSearchOutcome {
    let mut outcome = ConnectorSearchOutcome {
        attempted: request.account_ids.len(),
        ..Default::default()
    };

    let mut tasks: JoinSet<(AccountId, Result<Vec<MessageResult>>)> = JoinSet::new();
    for account_id in &request.account_ids {
        let connector = Arc::clone(&connector);
        let request = Arc::clone(&request);
        let cancel = cancel.clone();
        let progress = progress.clone();
        let account_id = account_id.clone();
        tasks.spawn(async move {
            let result = search_one_account(
                connector.as_ref(),
                &account_id,
                &request,
                &cancel,
                progress.as_ref(),
            )
            .await;
            (account_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((account_id, Ok(mut results))) => {
                for message in &mut results {
                    message.account_id.get_or_insert_with(|| account_id.clone());
                }
                outcome.results.append(&mut results);
            }
            Ok((account_id, Err(err))) => {
                tracing::warn!(platform = %connector.platform(), account = %account_id, error = %err, "account search failed");
                outcome.failures.push((account_id, err));
            }
            Err(join_err) => {
                tracing::error!(platform = %connector.platform(), error = %join_err, "account search task panicked");
            }
        }
    }

    sort_descending(&mut outcome.results);
    outcome
}

async fn search_one_account(
    connector: &dyn Connector,
    account_id: &AccountId,
    request: &ConnectorSearchRequest,
    cancel: &CancelToken,
    progress: Option<&ProgressSink>,
) -> Result<Vec<MessageResult>> {
    match connector
        .search_account(account_id, request, cancel, progress)
        .await
    {
        Err(ConnectorError::AuthExpired) => {
            tracing::debug!(account = %account_id, "access token rejected, refreshing");
            let refreshed = connector.refresh_token(account_id).await;
            if refreshed.success {
                connector
                    .search_account(account_id, request, cancel, progress)
                    .await
            } else if refreshed.requires_reauth {
                Err(ConnectorError::ReauthRequired)
            } else {
                Err(ConnectorError::AuthExpired)
            }
        }
        other => other,
    }
}
