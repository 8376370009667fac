//! Cache fingerprint: a deterministic key for a normalized request.
//!
//! The canonical document lowercases and trims the query, sorts the account
//! ids, and includes filters and pagination, so equal requests hash equally
//! regardless of account-id order or query casing.

use crate::error::Result;
use crate::search::request::SearchRequest;
use serde::Serialize;
use sha2::{Digest, Sha256};
use unisearch_connector::{AccountId, SearchFilters};

#[derive(Serialize)]
struct Canonical<'a> {
    query: String,
    account_ids: Vec<&'a str>,
    filters: &'a SearchFilters,
    page: usize,
    limit: usize,
}

/// Computes the hex-encoded SHA-256 fingerprint of a request as dispatched
/// to `accounts`.
///
/// # Errors
///
/// Returns an error if the canonical document cannot be serialized.
pub fn fingerprint(request: &SearchRequest, accounts: &[AccountId]) -> Result<String> {
    let mut account_ids: Vec<&str> = accounts.iter().map(AccountId::as_str).collect();
    account_ids.sort_unstable();

    let pagination = request.effective_pagination();
    let canonical = Canonical {
        query: request.query.trim().to_lowercase(),
        account_ids,
        filters: &request.filters,
        page: pagination.page,
        limit: pagination.limit,
    };

    let document = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&document);
    Ok(format!("{digest:x}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::request::Pagination;
    use unisearch_connector::{DateRange, MessageType};

    fn accounts(ids: &[&str]) -> Vec<AccountId> {
        ids.iter().map(|id| AccountId::new(*id)).collect()
    }

    #[test]
    fn invariant_under_account_order() {
        let request = SearchRequest::new("order-12345");
        let a = fingerprint(&request, &accounts(&["b", "a", "c"])).unwrap();
        let b = fingerprint(&request, &accounts(&["c", "a", "b"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invariant_under_query_case_and_whitespace() {
        let ids = accounts(&["a"]);
        let a = fingerprint(&SearchRequest::new("  Order-12345 "), &ids).unwrap();
        let b = fingerprint(&SearchRequest::new("order-12345"), &ids).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differs_when_filters_differ() {
        let ids = accounts(&["a"]);
        let plain = fingerprint(&SearchRequest::new("x"), &ids).unwrap();
        let filtered = fingerprint(
            &SearchRequest::new("x").with_filters(SearchFilters {
                message_type: Some(MessageType::File),
                ..Default::default()
            }),
            &ids,
        )
        .unwrap();
        assert_ne!(plain, filtered);

        let dated = fingerprint(
            &SearchRequest::new("x").with_filters(SearchFilters {
                date_range: Some(DateRange::default()),
                ..Default::default()
            }),
            &ids,
        )
        .unwrap();
        assert_ne!(plain, dated);
    }

    #[test]
    fn differs_when_pagination_differs() {
        let ids = accounts(&["a"]);
        let page1 = fingerprint(&SearchRequest::new("x"), &ids).unwrap();
        let page2 = fingerprint(
            &SearchRequest::new("x").with_pagination(Pagination { page: 2, limit: 20 }),
            &ids,
        )
        .unwrap();
        assert_ne!(page1, page2);
    }

    #[test]
    fn is_hex_sha256() {
        let key = fingerprint(&SearchRequest::new("x"), &accounts(&["a"])).unwrap();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
