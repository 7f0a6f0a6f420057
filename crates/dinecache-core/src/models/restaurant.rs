use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::wire;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A restaurant document as served by `GET /restaurants[/{id}]`.
///
/// Fields the app does not model are kept in `extra` so a cached copy
/// serializes back to the same document the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Restaurant {
    #[serde(deserialize_with = "wire::flexible_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(
        default,
        deserialize_with = "wire::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub photograph: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latlng: Option<LatLng>,
    #[serde(default)]
    pub cuisine_type: String,
    /// Day to hours, in the order the server lists them.
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "Record<string, string>"))]
    pub operating_hours: Map<String, Value>,
    #[serde(default, deserialize_with = "wire::flexible_bool")]
    pub is_favorite: bool,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub created_at: Option<Value>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub updated_at: Option<Value>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Restaurant {
    pub fn favorite_display(&self) -> &'static str {
        if self.is_favorite {
            "★"
        } else {
            "☆"
        }
    }
}

/// Acknowledgement handed back after a favorite toggle has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct FavoriteUpdate {
    pub id: i64,
    pub value: bool,
}

/// Everything a map widget needs to place a restaurant marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub alt: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": 1,
            "name": "Mission Chinese Food",
            "neighborhood": "Manhattan",
            "photograph": "1",
            "address": "171 E Broadway, New York, NY 10002",
            "latlng": {"lat": 40.713829, "lng": -73.989667},
            "cuisine_type": "Asian",
            "operating_hours": {
                "Monday": "5:30 pm - 11:00 pm",
                "Tuesday": "5:30 pm - 12:00 am",
                "Sunday": "5:30 pm - 11:00 pm",
                "Friday": "5:30 pm - 12:00 am"
            },
            "is_favorite": "true",
            "createdAt": 1504095563444_i64,
            "updatedAt": "2018-06-05T17:20:03.541Z",
            "reviews_count": 3
        })
    }

    #[test]
    fn test_parse_restaurant_with_string_favorite() {
        let r: Restaurant = serde_json::from_value(sample()).unwrap();
        assert_eq!(r.id, 1);
        assert!(r.is_favorite);
        assert_eq!(r.photograph.as_deref(), Some("1"));
        assert_eq!(r.latlng, Some(LatLng { lat: 40.713829, lng: -73.989667 }));
        assert_eq!(r.operating_hours["Monday"], json!("5:30 pm - 11:00 pm"));
    }

    #[test]
    fn test_unknown_fields_survive_serialization() {
        let r: Restaurant = serde_json::from_value(sample()).unwrap();
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["reviews_count"], json!(3));
        assert_eq!(back["updatedAt"], json!("2018-06-05T17:20:03.541Z"));
        let days: Vec<&String> = back["operating_hours"].as_object().unwrap().keys().collect();
        assert_eq!(days, ["Monday", "Tuesday", "Sunday", "Friday"]);
        // Normalized to a real boolean on the way out.
        assert_eq!(back["is_favorite"], json!(true));
    }

    #[test]
    fn test_minimal_restaurant() {
        let r: Restaurant = serde_json::from_value(json!({"id": "10", "photograph": 10})).unwrap();
        assert_eq!(r.id, 10);
        assert!(!r.is_favorite);
        assert_eq!(r.photograph.as_deref(), Some("10"));
        assert!(r.latlng.is_none());
    }

    #[test]
    fn test_unreadable_favorite_is_not_favorite() {
        let list: Vec<Restaurant> = serde_json::from_value(json!([
            {"id": 1, "is_favorite": "maybe"},
            {"id": 2, "is_favorite": "true"}
        ]))
        .unwrap();
        assert!(!list[0].is_favorite);
        assert!(list[1].is_favorite);
    }

    #[test]
    fn test_favorite_display() {
        let mut r: Restaurant = serde_json::from_value(json!({"id": 1})).unwrap();
        assert_eq!(r.favorite_display(), "☆");
        r.is_favorite = true;
        assert_eq!(r.favorite_display(), "★");
    }
}
