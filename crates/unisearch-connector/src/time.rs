//! Timestamp normalization.
//!
//! Platform APIs disagree on time encoding: Lark sends epoch milliseconds
//! as strings, Gmail sends `internalDate` as a string of epoch milliseconds,
//! Slack sends `ts` as fractional epoch seconds in a string. Everything is
//! normalized to `DateTime<Utc>` here before any comparison or sorting.

use chrono::{DateTime, Utc};

/// Parses a string of epoch milliseconds (`"1706000000000"`).
#[must_use]
pub fn parse_epoch_ms(raw: &str) -> Option<DateTime<Utc>> {
    let ms: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp_millis(ms)
}

/// Parses a string of fractional epoch seconds (`"1706000000.123456"`).
#[must_use]
pub fn parse_epoch_secs(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let (secs, frac) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
    let secs: i64 = secs.parse().ok()?;
    // Keep microsecond precision; Slack ts fractions are 6 digits.
    let frac_padded = format!("{frac:0<6}");
    let micros: i64 = frac_padded.get(..6)?.parse().ok()?;
    DateTime::from_timestamp_micros(secs.checked_mul(1_000_000)? + micros)
}
