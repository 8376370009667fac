//! Client-side filtering for platforms whose APIs cannot evaluate a filter
//! server-side.
//!
//! Matching is deliberately plain: case-insensitive substring containment,
//! no tokenization or stemming.

use crate::model::{MessageType, Sender};
use crate::request::SearchFilters;
use chrono::{DateTime, Utc};

/// Case-insensitive substring match.
#[must_use]
pub fn keyword_matches(text: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    text.to_lowercase().contains(&query.to_lowercase())
}

/// Case-insensitive substring match against sender name, id and email.
#[must_use]
pub fn sender_matches(sender: &Sender, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    sender.name.to_lowercase().contains(&needle)
        || sender.id.to_lowercase().contains(&needle)
        || sender
            .email
            .as_deref()
            .is_some_and(|email| email.to_lowercase().contains(&needle))
}

/// Applies the filters a platform did not evaluate server-side.
///
/// `date_checked` is true when the platform already applied the time range
/// natively, so it is not re-checked here.
#[must_use]
pub fn message_passes(
    content: &str,
    sender: &Sender,
    message_type: MessageType,
    timestamp: DateTime<Utc>,
    query: &str,
    filters: &SearchFilters,
    date_checked: bool,
) -> bool {
    if !keyword_matches(content, query) {
        return false;
    }
    if let Some(wanted) = &filters.sender
        && !sender_matches(sender, wanted)
    {
        return false;
    }
    if let Some(wanted) = filters.message_type
        && message_type != wanted
    {
        return false;
    }
    if !date_checked
        && let Some(range) = &filters.date_range
        && !range.contains(timestamp)
    {
        return false;
    }
    true
}
