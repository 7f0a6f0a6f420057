//! Request and response types for the router, and route classification.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::api::ApiRequest;
use crate::cache::ALL_RESTAURANTS_KEY;

/// Body of every failed API read.
pub const FETCH_ERROR_BODY: &str = "Error fetching data";

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseSource {
    /// Fresh cached data, the network was not contacted.
    Cache,
    /// Cached data past its TTL, served because the network failed.
    StaleCache,
    Network,
    /// A substitute, such as the placeholder image for a missing photo.
    Fallback,
    Error,
}

impl ResponseSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, ResponseSource::Cache | ResponseSource::StaleCache)
    }
}

/// A request as a page would issue it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
        }
    }

    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn to_api_request(&self) -> ApiRequest {
        ApiRequest {
            method: self.method.clone(),
            url: self.url.to_string(),
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>, source: ResponseSource) -> Self {
        Self {
            status,
            body: body.into(),
            source,
        }
    }

    pub(crate) fn json_value(data: &Value, source: ResponseSource) -> Self {
        Self::new(200, data.to_string(), source)
    }

    pub fn fetch_error() -> Self {
        Self::new(500, FETCH_ERROR_BODY, ResponseSource::Error)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// What a request is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The restaurant list (key `"-1"`) or one restaurant.
    Restaurants { key: String },
    /// Reviews, optionally narrowed to one restaurant.
    Reviews { restaurant_id: Option<i64> },
    Asset,
}

/// Requests to the API port go to the API handlers, anything else is an
/// asset.
pub fn classify(url: &Url, api_port: u16) -> Route {
    if url.port_or_known_default() != Some(api_port) {
        return Route::Asset;
    }

    let query_id = url
        .query_pairs()
        .find(|(name, _)| name == "restaurant_id")
        .and_then(|(_, value)| value.parse::<i64>().ok())
        .filter(|id| *id > 0);

    let last_segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .to_string();

    if url.path().contains("reviews") {
        let restaurant_id = query_id.or_else(|| last_segment.parse().ok());
        return Route::Reviews { restaurant_id };
    }

    let key = match query_id {
        Some(id) => id.to_string(),
        None if last_segment == "restaurants" || last_segment.is_empty() => {
            ALL_RESTAURANTS_KEY.to_string()
        }
        None => last_segment,
    };
    Route::Restaurants { key }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(url: &str) -> Route {
        classify(&Url::parse(url).unwrap(), 1337)
    }

    #[test]
    fn test_other_ports_are_assets() {
        assert_eq!(route("http://localhost:8000/index.html"), Route::Asset);
        assert_eq!(route("http://localhost:8000/restaurants"), Route::Asset);
        assert_eq!(route("https://unpkg.com/leaflet.js"), Route::Asset);
    }

    #[test]
    fn test_restaurant_routes() {
        assert_eq!(
            route("http://localhost:1337/restaurants"),
            Route::Restaurants { key: "-1".into() }
        );
        assert_eq!(
            route("http://localhost:1337/restaurants/"),
            Route::Restaurants { key: "-1".into() }
        );
        assert_eq!(
            route("http://localhost:1337/restaurants/3"),
            Route::Restaurants { key: "3".into() }
        );
    }

    #[test]
    fn test_review_routes() {
        assert_eq!(
            route("http://localhost:1337/reviews/?restaurant_id=4"),
            Route::Reviews { restaurant_id: Some(4) }
        );
        assert_eq!(
            route("http://localhost:1337/reviews/"),
            Route::Reviews { restaurant_id: None }
        );
        assert_eq!(
            route("http://localhost:1337/reviews/?restaurant_id=0"),
            Route::Reviews { restaurant_id: None }
        );
    }

    #[test]
    fn test_error_response() {
        let response = Response::fetch_error();
        assert_eq!(response.status, 500);
        assert_eq!(response.text(), FETCH_ERROR_BODY);
        assert!(!response.source.is_cached());
    }
}
