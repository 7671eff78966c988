//! Small shared helpers.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// Parse an RFC3339 timestamp. Externally-written rows mix `Z` suffixes,
/// numeric offsets, and fractional precision.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Chronological comparison of two timestamp strings.
///
/// Lexicographic comparison mis-orders `...T10:00:00Z` against
/// `...T10:00:00.500+00:00`, so every ordering decision in the engine goes
/// through here. Unparseable values fall back to string order.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}
