//! Timestamp encoding shared by every table.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (millisecond
//! precision, `Z` suffix) so that SQL string comparison orders them
//! chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Encode a timestamp for storage.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to storage precision, so values read back
/// compare equal to the ones written.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_ts(&format_ts(now)).unwrap_or(now)
}
