use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::wire;

/// Highest star rating the review form offers.
pub const MAX_RATING: u8 = 5;

/// A review as served by `GET /reviews/?restaurant_id={id}`.
///
/// Reviews written while offline are cached before the server has assigned
/// them an id, so `id` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Review {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "wire::flexible_i64")]
    pub restaurant_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "wire::flexible_rating")]
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
    #[serde(
        rename = "createdAt",
        default,
        deserialize_with = "wire::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<i64>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub updated_at: Option<Value>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Review {
    /// True for a review that only exists locally so far.
    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    pub fn date_display(&self) -> String {
        self.created_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|dt| dt.format("%b %d, %Y").to_string())
            .unwrap_or_default()
    }

    pub fn stars_display(&self) -> String {
        let filled = self.rating.min(MAX_RATING) as usize;
        format!(
            "{}{}",
            "★".repeat(filled),
            "☆".repeat(MAX_RATING as usize - filled)
        )
    }
}

/// Body of `POST /reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewReview {
    pub restaurant_id: i64,
    pub name: String,
    pub rating: u8,
    pub comments: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl NewReview {
    pub fn to_review(&self) -> Review {
        Review {
            id: None,
            restaurant_id: self.restaurant_id,
            name: self.name.clone(),
            rating: self.rating,
            comments: self.comments.clone(),
            created_at: Some(self.created_at),
            updated_at: None,
            extra: Map::new(),
        }
    }
}
