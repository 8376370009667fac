//! Connector-level search request and filters.

use crate::model::{AccountId, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time window for a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Only messages at or after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    /// Only messages at or before this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

impl DateRange {
    /// True when `ts` falls inside the range.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.after.is_none_or(|a| ts >= a) && self.before.is_none_or(|b| ts <= b)
    }
}

/// Filters applied to a search, server-side where the platform supports it
/// and client-side otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Time window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Case-insensitive substring matched against sender name/id/email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Only messages of this kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl SearchFilters {
    /// True when no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.sender.is_none() && self.message_type.is_none()
    }
}

/// One platform's share of a logical search: the query plus the accounts on
/// this platform it should run under. Immutable once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSearchRequest {
    /// Search keyword (case-insensitive substring).
    pub query: String,
    /// Accounts to search, all on this connector's platform.
    pub account_ids: Vec<AccountId>,
    /// Filters.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Hard cap on results collected per account.
    pub max_results: usize,
}

impl ConnectorSearchRequest {
    /// Creates a request with the default per-account cap.
    #[must_use]
    pub fn new(query: impl Into<String>, account_ids: Vec<AccountId>) -> Self {
        Self {
            query: query.into(),
            account_ids,
            filters: SearchFilters::default(),
            max_results: 200,
        }
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the per-account result cap.
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}
