//! The logical search request spanning platforms and accounts.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use unisearch_connector::{AccountId, Platform, SearchFilters};

/// Hard upper bound on the page size a caller may request.
const MAX_LIMIT: usize = 200;

/// 1-based result pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: usize,
    /// Results per page.
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    /// Clamps page to at least 1 and limit into `1..=MAX_LIMIT`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Index of the first result on this page. Saturates rather than
    /// overflowing for absurd page numbers.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Number of results the upstream fetch must gather to fill this page
    /// and still decide `has_more`. Saturates rather than overflowing.
    #[must_use]
    pub const fn fetch_target(&self) -> usize {
        self.page.saturating_mul(self.limit).saturating_add(1)
    }
}

/// One logical search across any number of platforms and accounts.
/// Immutable once dispatched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search keyword (case-insensitive substring).
    pub query: String,
    /// Restrict to these platforms; `None` means every platform with a
    /// connected account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Platform>>,
    /// Restrict to these accounts; `None` means all connected accounts in
    /// scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<Vec<AccountId>>,
    /// Filters applied on top of the keyword.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Result pagination.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl SearchRequest {
    /// Creates a request for a query with default scope and pagination.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Restricts the request to specific platforms.
    #[must_use]
    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = Some(platforms);
        self
    }

    /// Restricts the request to specific accounts.
    #[must_use]
    pub fn with_accounts(mut self, account_ids: Vec<AccountId>) -> Self {
        self.account_ids = Some(account_ids);
        self
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the pagination.
    #[must_use]
    pub const fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Effective pagination, defaulted and clamped.
    #[must_use]
    pub fn effective_pagination(&self) -> Pagination {
        self.pagination.unwrap_or_default().clamped()
    }

    /// Validates caller-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuery`] when the query is empty or whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.fetch_target(), 21);
    }

    #[test]
    fn pagination_clamps() {
        let p = Pagination { page: 0, limit: 0 }.clamped();
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 1);

        let p = Pagination {
            page: 3,
            limit: 10_000,
        }
        .clamped();
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(p.offset(), 2 * MAX_LIMIT);
    }

    #[test]
    fn extreme_page_saturates_instead_of_overflowing() {
        let p = Pagination {
            page: usize::MAX,
            limit: 10_000,
        }
        .clamped();
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(p.offset(), usize::MAX);
        assert_eq!(p.fetch_target(), usize::MAX);
    }

    #[test]
    fn empty_query_rejected() {
        assert!(matches!(
            SearchRequest::new("   ").validate(),
            Err(Error::EmptyQuery)
        ));
        assert!(SearchRequest::new("order-12345").validate().is_ok());
    }
}
