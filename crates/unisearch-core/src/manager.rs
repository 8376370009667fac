//! The aggregation manager: connector registry, search orchestration,
//! cancellation, and the auth pass-throughs.
//!
//! One `search` call runs the eight-step pipeline: validate, resolve target
//! accounts, fingerprint, cache lookup (single-flight), group by platform,
//! dispatch platform tasks concurrently, merge/sort/paginate, store. A
//! platform failing never aborts its siblings; the caller always gets a
//! best-effort response with per-platform diagnostics.

use crate::account::{Account, AccountRegistry, ConnectionStatus};
use crate::cache::{CacheStats, Lookup, ResultCache};
use crate::error::{Error, Result};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::search::fingerprint::fingerprint;
use crate::search::request::SearchRequest;
use crate::search::response::{PlatformSearchStatus, SearchResponse};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use unisearch_connector::{
    AccountId, CancelToken, Connector, ConnectorConfig, ConnectorSearchRequest, MessageResult,
    Platform, ProgressSink, build_connector, search_accounts,
};
use unisearch_oauth::CredentialStore;

/// Identifier of one in-flight search, usable with [`SearchManager::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchId(u64);

impl std::fmt::Display for SearchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "search-{}", self.0)
    }
}

/// Owns the connector registry, account registry, cache, and metrics, and
/// orchestrates searches across them. All state is instance-owned and
/// injected at construction; there are no globals.
pub struct SearchManager {
    connectors: RwLock<HashMap<Platform, Arc<dyn Connector>>>,
    accounts: AccountRegistry,
    cache: ResultCache,
    metrics: MetricsCollector,
    next_search_id: AtomicU64,
    in_flight: std::sync::Mutex<HashMap<SearchId, CancelToken>>,
}

impl Default for SearchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchManager {
    /// Creates a manager with default cache settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache(ResultCache::default())
    }

    /// Creates a manager over a specific cache configuration.
    #[must_use]
    pub fn with_cache(cache: ResultCache) -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
            accounts: AccountRegistry::new(),
            cache,
            metrics: MetricsCollector::new(),
            next_search_id: AtomicU64::new(1),
            in_flight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The account registry.
    #[must_use]
    pub const fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Loads (or replaces) the connector for its platform.
    pub async fn load_connector(&self, connector: Arc<dyn Connector>) {
        let platform = connector.platform();
        tracing::info!(%platform, "loading connector");
        self.connectors.write().await.insert(platform, connector);
    }

    /// Builds a connector from config and loads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub async fn load_connector_from_config(
        &self,
        config: &ConnectorConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<()> {
        let connector = build_connector(config, store)?;
        self.load_connector(connector).await;
        Ok(())
    }

    /// Unloads a platform's connector and disconnects it. Searches already
    /// in flight keep their own handle and are unaffected.
    pub async fn unload_connector(&self, platform: Platform) {
        let removed = self.connectors.write().await.remove(&platform);
        if let Some(connector) = removed {
            tracing::info!(%platform, "unloading connector");
            connector.disconnect().await;
        }
    }

    /// Replaces a platform's connector: unload then load.
    pub async fn reload_connector(&self, connector: Arc<dyn Connector>) {
        self.unload_connector(connector.platform()).await;
        self.load_connector(connector).await;
    }

    fn connector_for(
        connectors: &HashMap<Platform, Arc<dyn Connector>>,
        platform: Platform,
    ) -> Option<Arc<dyn Connector>> {
        connectors.get(&platform).map(Arc::clone)
    }

    /// Registers a cancellable search and returns its id.
    pub fn new_search_id(&self) -> SearchId {
        let id = SearchId(self.next_search_id.fetch_add(1, Ordering::Relaxed));
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, CancelToken::new());
        id
    }

    /// Cancels one in-flight search. Returns false when the id is unknown
    /// or already finished.
    pub fn cancel(&self, id: SearchId) -> bool {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.get(&id).is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Cancels every in-flight search.
    pub fn cancel_all(&self) {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for token in in_flight.values() {
            token.cancel();
        }
    }

    fn take_cancel_token(&self, id: SearchId) -> CancelToken {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn finish_search(&self, id: SearchId) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Runs one logical search. See the module docs for the pipeline.
    ///
    /// # Errors
    ///
    /// Only request-validation failures error: empty query, an explicitly
    /// named account the registry does not know, or no searchable accounts
    /// in scope. Platform and account failures are reported inside the
    /// response's `platform_status`.
    pub async fn search(
        &self,
        request: &SearchRequest,
        progress: Option<ProgressSink>,
    ) -> Result<SearchResponse> {
        self.search_as(self.new_search_id(), request, progress).await
    }

    /// Runs one logical search under a pre-allocated id (see
    /// [`SearchManager::new_search_id`]) so another task can cancel it
    /// mid-flight. The id is released when the search finishes.
    ///
    /// # Errors
    ///
    /// Same contract as [`SearchManager::search`].
    pub async fn search_as(
        &self,
        id: SearchId,
        request: &SearchRequest,
        progress: Option<ProgressSink>,
    ) -> Result<SearchResponse> {
        let result = self.run_search(id, request, progress).await;
        self.finish_search(id);
        result
    }

    async fn run_search(
        &self,
        id: SearchId,
        request: &SearchRequest,
        progress: Option<ProgressSink>,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        request.validate()?;
        self.metrics.record_search();

        let (targets, reauth_only) = self.resolve_targets(request).await?;
        let target_ids: Vec<AccountId> = targets.iter().map(|a| a.id.clone()).collect();

        let key = fingerprint(request, &target_ids)?;
        let guard = match self.cache.begin(&key).await {
            Lookup::Hit(mut response) => {
                tracing::debug!(%id, key = %key, "cache hit");
                self.metrics.record_cache_hit();
                response.from_cache = true;
                return Ok(response);
            }
            Lookup::Miss(guard) => {
                self.metrics.record_cache_miss();
                guard
            }
        };

        let cancel = self.take_cancel_token(id);
        let mut response = self
            .dispatch(request, &targets, &reauth_only, &cancel, progress)
            .await;

        response.elapsed_ms = elapsed_ms(started);
        self.metrics.record_latency_ms(response.elapsed_ms);

        if !cancel.is_cancelled() {
            self.cache.set(&key, response.clone(), target_ids).await;
        }
        drop(guard);
        Ok(response)
    }

    /// Resolves the accounts in scope: searchable targets plus the platforms
    /// whose only in-scope accounts are awaiting re-authorization (reported
    /// but not dispatched).
    async fn resolve_targets(
        &self,
        request: &SearchRequest,
    ) -> Result<(Vec<Account>, HashSet<Platform>)> {
        let mut in_scope: Vec<Account> = if let Some(ids) = &request.account_ids {
            let mut accounts = Vec::with_capacity(ids.len());
            for account_id in ids {
                let account = self
                    .accounts
                    .get(account_id)
                    .await
                    .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
                accounts.push(account);
            }
            accounts
        } else {
            self.accounts.list().await
        };

        if let Some(platforms) = &request.platforms {
            in_scope.retain(|a| platforms.contains(&a.platform));
        }

        let (targets, excluded): (Vec<Account>, Vec<Account>) =
            in_scope.into_iter().partition(Account::is_searchable);
        if targets.is_empty() {
            return Err(Error::NoAccounts);
        }

        let dispatched: HashSet<Platform> = targets.iter().map(|a| a.platform).collect();
        let reauth_only: HashSet<Platform> = excluded
            .iter()
            .filter(|a| a.status == ConnectionStatus::Error)
            .map(|a| a.platform)
            .filter(|p| !dispatched.contains(p))
            .collect();

        Ok((targets, reauth_only))
    }

    /// Steps 3-6: group by platform, dispatch concurrently, collect, merge.
    async fn dispatch(
        &self,
        request: &SearchRequest,
        targets: &[Account],
        reauth_only: &HashSet<Platform>,
        cancel: &CancelToken,
        progress: Option<ProgressSink>,
    ) -> SearchResponse {
        let pagination = request.effective_pagination();

        let mut groups: HashMap<Platform, Vec<AccountId>> = HashMap::new();
        for account in targets {
            groups
                .entry(account.platform)
                .or_default()
                .push(account.id.clone());
        }

        let mut response = SearchResponse::default();
        for &platform in reauth_only {
            response.platform_status.insert(
                platform,
                PlatformSearchStatus {
                    platform,
                    success: false,
                    result_count: 0,
                    error: Some("accounts require re-authorization".to_string()),
                    elapsed_ms: 0,
                },
            );
        }

        let connectors = self.connectors.read().await;
        let mut tasks: JoinSet<(Platform, PlatformDispatch)> = JoinSet::new();
        for (platform, account_ids) in groups {
            let Some(connector) = Self::connector_for(&connectors, platform) else {
                tracing::warn!(%platform, "search targets a platform with no loaded connector");
                response.platform_status.insert(
                    platform,
                    PlatformSearchStatus {
                        platform,
                        success: false,
                        result_count: 0,
                        error: Some("no connector loaded".to_string()),
                        elapsed_ms: 0,
                    },
                );
                continue;
            };

            let sub_request = Arc::new(
                ConnectorSearchRequest::new(request.query.clone(), account_ids)
                    .with_filters(request.filters.clone())
                    .with_max_results(pagination.fetch_target()),
            );
            let cancel = cancel.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let outcome = search_accounts(connector, sub_request, cancel, progress).await;
                (
                    platform,
                    PlatformDispatch {
                        outcome,
                        elapsed_ms: elapsed_ms(started),
                    },
                )
            });
        }
        drop(connectors);

        let mut merged: Vec<MessageResult> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((platform, dispatch)) = joined else {
                tracing::error!("platform dispatch task panicked");
                continue;
            };

            for (account_id, error) in &dispatch.outcome.failures {
                if error.requires_reauth() {
                    tracing::warn!(account = %account_id, "account requires re-authorization");
                    self.accounts
                        .set_status(account_id, ConnectionStatus::Error)
                        .await;
                    self.cache.invalidate_account(account_id).await;
                }
            }

            let success = dispatch.outcome.any_succeeded();
            if !success {
                self.metrics.record_platform_error(platform);
            }
            response.platform_status.insert(
                platform,
                PlatformSearchStatus {
                    platform,
                    success,
                    result_count: 0,
                    error: (!success).then(|| {
                        dispatch
                            .outcome
                            .failures
                            .first()
                            .map_or_else(|| "all accounts failed".to_string(), |(_, e)| e.to_string())
                    }),
                    elapsed_ms: dispatch.elapsed_ms,
                },
            );
            merged.extend(dispatch.outcome.results);
        }

        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        response.total = merged.len();

        let offset = pagination.offset();
        response.has_more = merged.len() > offset + pagination.limit;
        response.results = merged
            .into_iter()
            .skip(offset)
            .take(pagination.limit)
            .collect();

        for status in response.platform_status.values_mut() {
            status.result_count = response
                .results
                .iter()
                .filter(|m| m.platform == status.platform)
                .count();
        }

        response
    }

    fn platform_of(account_id: &AccountId) -> Result<Platform> {
        let tag = account_id
            .as_str()
            .split_once(':')
            .map_or(account_id.as_str(), |(tag, _)| tag);
        Platform::from_str(tag).map_err(Error::UnknownPlatform)
    }

    async fn connector_of_account(&self, account_id: &AccountId) -> Result<Arc<dyn Connector>> {
        let platform = match self.accounts.get(account_id).await {
            Some(account) => account.platform,
            None => Self::platform_of(account_id)?,
        };
        Self::connector_for(&*self.connectors.read().await, platform)
            .ok_or(Error::ConnectorNotLoaded(platform))
    }

    /// Exchanges an authorization code on a platform's connector. On success
    /// the authorizing user is recorded as a connected account.
    pub async fn authenticate_platform(
        &self,
        platform: Platform,
        code: &str,
    ) -> unisearch_connector::AuthResult {
        let Some(connector) = Self::connector_for(&*self.connectors.read().await, platform) else {
            return unisearch_connector::AuthResult::failed(format!(
                "no connector loaded for {platform}"
            ));
        };

        let result = connector.authenticate(code).await;
        if result.success
            && let Some(user) = &result.user_info
        {
            self.accounts
                .add(Account::new(platform, &user.id, &user.name))
                .await;
        }
        result
    }

    /// Refreshes an account's token. A `requires_reauth` outcome marks the
    /// account `Error` and drops its cached results; a successful refresh
    /// restores `Connected`.
    pub async fn refresh_platform_token(
        &self,
        account_id: &AccountId,
    ) -> unisearch_connector::AuthResult {
        let connector = match self.connector_of_account(account_id).await {
            Ok(connector) => connector,
            Err(err) => return unisearch_connector::AuthResult::failed(err.to_string()),
        };

        let result = connector.refresh_token(account_id).await;
        if result.requires_reauth {
            self.accounts
                .set_status(account_id, ConnectionStatus::Error)
                .await;
            self.cache.invalidate_account(account_id).await;
        } else if result.success {
            self.accounts
                .set_status(account_id, ConnectionStatus::Connected)
                .await;
        }
        result
    }

    /// Probes an account's connection, updating its status. Never errors.
    pub async fn test_platform_connection(&self, account_id: &AccountId) -> bool {
        let Ok(connector) = self.connector_of_account(account_id).await else {
            return false;
        };
        let alive = connector.validate_connection(account_id).await;
        let status = if alive {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Error
        };
        self.accounts.set_status(account_id, status).await;
        alive
    }

    /// Probes every registered account.
    pub async fn validate_all_connections(&self) -> HashMap<AccountId, bool> {
        let mut outcomes = HashMap::new();
        for account in self.accounts.list().await {
            let alive = self.test_platform_connection(&account.id).await;
            outcomes.insert(account.id, alive);
        }
        outcomes
    }

    /// Drops every cached result.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Cache size, hit rate, and entry summaries.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Snapshot of the engine counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zeroes the engine counters and the cache hit/miss counters. Cache
    /// contents are untouched.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.cache.reset_counters();
    }

    /// Cancels in-flight searches and disconnects every connector.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down search manager");
        self.cancel_all();
        let connectors: Vec<Arc<dyn Connector>> =
            self.connectors.write().await.drain().map(|(_, c)| c).collect();
        for connector in connectors {
            connector.disconnect().await;
        }
    }
}

struct PlatformDispatch {
    outcome: unisearch_connector::ConnectorSearchOutcome,
    elapsed_ms: u64,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
