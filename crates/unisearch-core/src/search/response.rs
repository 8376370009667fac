//! The merged search response and per-platform diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unisearch_connector::{MessageResult, Platform};

/// Outcome of one platform's dispatch within a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSearchStatus {
    /// Platform this status describes.
    pub platform: Platform,
    /// False only when every account on the platform failed.
    pub success: bool,
    /// Number of this platform's results in the merged output.
    pub result_count: usize,
    /// Error description when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time the platform dispatch took.
    pub elapsed_ms: u64,
}

/// The caller-facing result of one search. Constructed fresh per search and
/// never mutated after return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Merged results, timestamp-descending, truncated to the requested page.
    pub results: Vec<MessageResult>,
    /// Total results gathered across platforms, before pagination.
    pub total: usize,
    /// Whether more results exist past this page.
    pub has_more: bool,
    /// Wall time for the whole search.
    pub elapsed_ms: u64,
    /// One status per dispatched platform, success or not.
    pub platform_status: HashMap<Platform, PlatformSearchStatus>,
    /// True when this response was served from the result cache.
    #[serde(default)]
    pub from_cache: bool,
}
