//! Manifest timestamps
//!
//! Written as RFC 3339 (chrono's serde default). Read back leniently: an
//! ISO-8601 local time without an offset, as older manifests carry, is taken
//! to be UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer};

/// Deserialize an RFC 3339 or offset-less ISO-8601 timestamp.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse(&text).ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 timestamp '{text}'")))
}

fn parse(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
