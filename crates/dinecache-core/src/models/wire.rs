//! Lenient deserializers for fields the review server stores loosely.
//!
//! The server keeps query-string values as text, so booleans and ids show up
//! either as JSON scalars or as strings depending on how they were written.
//! Display-only fields never fail a document: a value that cannot be read
//! falls back to the default with a warning.

use chrono::DateTime;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use super::review::MAX_RATING;

pub fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::String(ref s)) if s.trim() == "true" => true,
        Some(Value::String(ref s)) if matches!(s.trim(), "false" | "") => false,
        Some(Value::Number(ref n)) if n.as_i64() == Some(1) => true,
        Some(Value::Number(ref n)) if n.as_i64() == Some(0) => false,
        Some(other) => {
            warn!(value = %other, "Unreadable boolean, using false");
            false
        }
    })
}

pub fn flexible_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_i64(&value).ok_or_else(|| de::Error::custom(format!("invalid integer: {}", value)))
}

/// Ratings outside `0..=MAX_RATING` are clamped, unreadable ones become 0.
pub fn flexible_rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(0),
        Some(value) => value,
    };
    match value_to_i64(&value) {
        Some(n) if (0..=i64::from(MAX_RATING)).contains(&n) => Ok(n as u8),
        Some(n) => {
            warn!(rating = n, "Rating out of range, clamping");
            Ok(n.clamp(0, i64::from(MAX_RATING)) as u8)
        }
        None => {
            warn!(value = %value, "Unreadable rating, using 0");
            Ok(0)
        }
    }
}

/// Photographs are file stems, written as `"1"` or `1`.
pub fn optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("invalid string: {}", other))),
    }
}

/// Timestamps arrive as epoch milliseconds or as RFC 3339 strings. Anything
/// else is dropped.
pub fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    let value = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let parsed = match value {
        Value::String(ref s) => s.trim().parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        ref other => value_to_i64(other),
    };
    if parsed.is_none() {
        warn!(value = %value, "Unreadable timestamp, ignoring");
    }
    Ok(parsed)
}

pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
