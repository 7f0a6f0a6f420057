use std::sync::Arc;

use chrono::Duration;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{ApiError, ApiResponse, Transport};
use crate::cache::{AssetCache, CacheManager, CachedData, ReviewRecord};
use crate::sync::Connectivity;

use super::route::{classify, Request, Response, ResponseSource, Route};

/// Served in place of a restaurant photo that cannot be fetched.
pub const PLACEHOLDER_IMAGE: &str = "/img/ImageN-A.png";

/// Decides for each request whether the answer comes from the local store,
/// the network, or both.
pub struct RequestRouter {
    store: Arc<CacheManager>,
    assets: Arc<AssetCache>,
    transport: Arc<dyn Transport>,
    connectivity: Connectivity,
    api_port: u16,
    ttl: Option<Duration>,
    offline_mode: bool,
}

impl RequestRouter {
    pub fn new(
        store: Arc<CacheManager>,
        assets: Arc<AssetCache>,
        transport: Arc<dyn Transport>,
        connectivity: Connectivity,
        api_port: u16,
    ) -> Self {
        Self {
            store,
            assets,
            transport,
            connectivity,
            api_port,
            ttl: None,
            offline_mode: false,
        }
    }

    /// Cached API data older than `ttl` is refreshed when the network
    /// allows. `None` keeps cached data forever.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_offline_mode(mut self, offline_mode: bool) -> Self {
        self.offline_mode = offline_mode;
        self
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub async fn handle(&self, request: Request) -> Response {
        let route = classify(&request.url, self.api_port);
        debug!(method = %request.method, url = %request.url, ?route, "Routing request");

        match route {
            Route::Asset => self.handle_asset(&request).await,
            _ if request.method != Method::GET => self.pass_through(&request).await,
            Route::Restaurants { key } => self.handle_restaurants(&request, &key).await,
            Route::Reviews { restaurant_id } => self.handle_reviews(&request, restaurant_id).await,
        }
    }

    /// Send to the network. With `track` set the outcome updates the shared
    /// connectivity state.
    async fn send(&self, request: &Request, track: bool) -> Result<ApiResponse, ApiError> {
        if self.offline_mode {
            return Err(ApiError::Offline);
        }
        let result = self.transport.send(&request.to_api_request()).await;
        if track {
            match &result {
                Ok(_) => self.connectivity.mark_online(),
                Err(e) if e.is_connectivity() => self.connectivity.mark_offline(),
                Err(_) => {}
            }
        }
        result
    }

    async fn fetch_json(&self, request: &Request) -> Result<Value, ApiError> {
        self.send(request, true).await?.error_for_status()?.json()
    }

    async fn pass_through(&self, request: &Request) -> Response {
        match self.send(request, true).await {
            Ok(response) => Response::new(response.status, response.body, ResponseSource::Network),
            Err(e) => {
                warn!(method = %request.method, url = %request.url, error = %e, "Request failed");
                Response::fetch_error()
            }
        }
    }

    fn cached<T>(&self, lookup: anyhow::Result<Option<CachedData<T>>>) -> Option<CachedData<T>> {
        lookup.unwrap_or_else(|e| {
            warn!(error = %e, "Cache read failed, treating as miss");
            None
        })
    }

    async fn handle_restaurants(&self, request: &Request, key: &str) -> Response {
        let cached = self.cached(self.store.get_restaurants(key));
        if let Some(ref entry) = cached {
            if !entry.is_stale(self.ttl) {
                return Response::json_value(&entry.data, ResponseSource::Cache);
            }
            debug!(key, age = %entry.age_display(), "Cached restaurants are stale");
        }

        match self.fetch_json(request).await {
            Ok(data) => {
                if let Err(e) = self.store.put_restaurants(key, data.clone()) {
                    warn!(key, error = %e, "Failed to cache restaurants");
                }
                Response::json_value(&data, ResponseSource::Network)
            }
            Err(e) => match cached {
                Some(entry) => {
                    info!(key, error = %e, "Network unavailable, serving stale restaurants");
                    Response::json_value(&entry.data, ResponseSource::StaleCache)
                }
                None => {
                    warn!(key, error = %e, "Failed to fetch restaurants");
                    Response::fetch_error()
                }
            },
        }
    }

    async fn handle_reviews(&self, request: &Request, restaurant_id: Option<i64>) -> Response {
        let cached = match restaurant_id {
            Some(id) => self.cached(self.store.reviews_for(id)),
            None => None,
        };
        if let Some(ref entry) = cached {
            if !entry.data.is_empty() && !entry.is_stale(self.ttl) {
                return Response::json_value(&Value::Array(entry.data.clone()), ResponseSource::Cache);
            }
        }

        let fetched = self.fetch_json(request).await.and_then(|data| match data {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::InvalidResponse(format!(
                "Expected a review list, got {}",
                other
            ))),
        });

        match fetched {
            Ok(mut items) => {
                let records: Vec<ReviewRecord> = items
                    .iter()
                    .filter_map(|item| ReviewRecord::from_server(item.clone(), restaurant_id))
                    .collect();
                let stored = match restaurant_id {
                    Some(id) => self.store.sync_reviews(id, records),
                    None => self.store.put_reviews(records).map(|_| Vec::new()),
                };
                match stored {
                    // Reviews still waiting in the queue are not on the server yet.
                    Ok(pending) => items.extend(pending),
                    Err(e) => warn!(?restaurant_id, error = %e, "Failed to cache reviews"),
                }
                Response::json_value(&Value::Array(items), ResponseSource::Network)
            }
            Err(e) => match cached {
                Some(entry) if !entry.data.is_empty() => {
                    info!(?restaurant_id, error = %e, "Network unavailable, serving stale reviews");
                    Response::json_value(&Value::Array(entry.data), ResponseSource::StaleCache)
                }
                _ => {
                    warn!(?restaurant_id, error = %e, "Failed to fetch reviews");
                    Response::fetch_error()
                }
            },
        }
    }

    async fn handle_asset(&self, request: &Request) -> Response {
        let cacheable = request.method == Method::GET;
        if cacheable {
            match self.assets.match_url(&request.url) {
                Ok(Some(body)) => return Response::new(200, body, ResponseSource::Cache),
                Ok(None) => {}
                Err(e) => warn!(url = %request.url, error = %e, "Asset cache read failed"),
            }
        }

        match self.send(request, false).await {
            Ok(response) => {
                if cacheable && response.is_success() {
                    if let Err(e) = self.assets.put(&request.url, &response.body) {
                        warn!(url = %request.url, error = %e, "Failed to cache asset");
                    }
                }
                Response::new(response.status, response.body, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Asset fetch failed");
                self.asset_fallback(&request.url)
            }
        }
    }

    fn asset_fallback(&self, url: &Url) -> Response {
        if url.path().ends_with(".jpg") {
            let placeholder = url
                .join(PLACEHOLDER_IMAGE)
                .ok()
                .and_then(|placeholder| self.assets.match_url(&placeholder).ok().flatten());
            if let Some(body) = placeholder {
                return Response::new(200, body, ResponseSource::Fallback);
            }
        }
        Response::new(503, "Offline", ResponseSource::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::StubTransport;
    use crate::models::QueuedRequest;
    use serde_json::json;

    const LIST_URL: &str = "http://localhost:1337/restaurants";
    const ONE_URL: &str = "http://localhost:1337/restaurants/2";
    const REVIEWS_URL: &str = "http://localhost:1337/reviews/?restaurant_id=2";

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<CacheManager>,
        assets: Arc<AssetCache>,
        stub: Arc<StubTransport>,
        connectivity: Connectivity,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(CacheManager::open(dir.path().to_path_buf()).unwrap());
            let assets = Arc::new(AssetCache::open(dir.path()).unwrap());
            Self {
                _dir: dir,
                store,
                assets,
                stub: Arc::new(StubTransport::new()),
                connectivity: Connectivity::new(),
            }
        }

        fn router(&self) -> RequestRouter {
            RequestRouter::new(
                Arc::clone(&self.store),
                Arc::clone(&self.assets),
                self.stub.clone(),
                self.connectivity.clone(),
                1337,
            )
            .with_ttl(Some(Duration::minutes(60)))
        }
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[tokio::test]
    async fn test_restaurants_cached_after_first_fetch() {
        let fx = Fixture::new();
        fx.stub.respond(Method::GET, LIST_URL, 200, &json!([{"id": 1}, {"id": 2}]));
        let router = fx.router();

        let first = router.handle(get(LIST_URL)).await;
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.json::<Value>().unwrap(), json!([{"id": 1}, {"id": 2}]));

        let second = router.handle(get(LIST_URL)).await;
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.json::<Value>().unwrap(), json!([{"id": 1}, {"id": 2}]));
        assert_eq!(fx.stub.request_count(), 1);
        assert!(fx.store.get_restaurants("-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_single_restaurant_is_keyed_by_id() {
        let fx = Fixture::new();
        fx.stub.respond(Method::GET, ONE_URL, 200, &json!({"id": 2, "name": "Kang Ho Dong"}));

        let response = fx.router().handle(get(ONE_URL)).await;
        assert!(response.is_success());
        let cached = fx.store.get_restaurants("2").unwrap().unwrap();
        assert_eq!(cached.data["name"], json!("Kang Ho Dong"));
    }

    #[tokio::test]
    async fn test_fetch_failure_without_cache_is_500() {
        let fx = Fixture::new();
        fx.stub.fail(Method::GET, LIST_URL);

        let response = fx.router().handle(get(LIST_URL)).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.text(), "Error fetching data");
        assert_eq!(response.source, ResponseSource::Error);
        assert!(!fx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_server_error_without_cache_is_500() {
        let fx = Fixture::new();
        fx.stub.respond(Method::GET, ONE_URL, 404, &json!({}));

        let response = fx.router().handle(get(ONE_URL)).await;
        assert_eq!(response.status, 500);
        assert!(fx.store.get_restaurants("2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_cache_refreshed_from_network() {
        let fx = Fixture::new();
        fx.store.put_restaurants("-1", json!([{"id": 1}])).unwrap();
        fx.stub.respond(Method::GET, LIST_URL, 200, &json!([{"id": 1}, {"id": 9}]));

        let response = fx.router().with_ttl(Some(Duration::zero())).handle(get(LIST_URL)).await;
        assert_eq!(response.source, ResponseSource::Network);
        let cached = fx.store.get_restaurants("-1").unwrap().unwrap();
        assert_eq!(cached.data, json!([{"id": 1}, {"id": 9}]));
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_network_fails() {
        let fx = Fixture::new();
        fx.store.put_restaurants("-1", json!([{"id": 1}])).unwrap();
        fx.stub.set_offline(true);

        let response = fx.router().with_ttl(Some(Duration::zero())).handle(get(LIST_URL)).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::StaleCache);
        assert_eq!(response.json::<Value>().unwrap(), json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn test_offline_mode_never_sends() {
        let fx = Fixture::new();
        fx.store.put_restaurants("-1", json!([{"id": 1}])).unwrap();
        let router = fx.router().with_ttl(Some(Duration::zero())).with_offline_mode(true);

        let cached = router.handle(get(LIST_URL)).await;
        assert_eq!(cached.source, ResponseSource::StaleCache);
        let missing = router.handle(get(ONE_URL)).await;
        assert_eq!(missing.status, 500);
        assert_eq!(fx.stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reviews_fetched_stored_and_served_from_cache() {
        let fx = Fixture::new();
        fx.stub.respond(
            Method::GET,
            REVIEWS_URL,
            200,
            &json!([{"id": 5, "restaurant_id": 2, "name": "A", "rating": 4, "comments": "ok"}]),
        );
        let router = fx.router();

        let first = router.handle(get(REVIEWS_URL)).await;
        assert_eq!(first.source, ResponseSource::Network);
        let reviews: Vec<Value> = first.json().unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0]["id"], json!(5));

        let second = router.handle(get(REVIEWS_URL)).await;
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(fx.stub.request_count(), 1);
    }

    #[tokio::test]
    async fn test_network_reviews_include_queued_local_review() {
        let fx = Fixture::new();
        let local_id = fx
            .store
            .put_local_review(2, json!({"restaurant_id": 2, "name": "Me", "rating": 5, "comments": "new"}), 1_700_000_000_000)
            .unwrap();
        fx.store
            .enqueue(
                QueuedRequest::new("POST", "http://localhost:1337/reviews/", Some(json!({"name": "Me"})))
                    .for_local_review(local_id),
            )
            .unwrap();
        fx.stub.respond(
            Method::GET,
            REVIEWS_URL,
            200,
            &json!([{"id": 5, "restaurant_id": 2, "name": "A", "rating": 4, "comments": "ok"}]),
        );

        let response = fx.router().with_ttl(Some(Duration::zero())).handle(get(REVIEWS_URL)).await;
        let reviews: Vec<Value> = response.json().unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0]["id"], json!(5));
        assert_eq!(reviews[1]["name"], json!("Me"));
    }

    #[tokio::test]
    async fn test_network_reviews_replace_the_cached_list() {
        let fx = Fixture::new();
        fx.store
            .put_reviews(vec![
                ReviewRecord::new(5, 2, json!({"id": 5, "restaurant_id": 2})),
                ReviewRecord::new(6, 2, json!({"id": 6, "restaurant_id": 2})),
            ])
            .unwrap();
        // Sent and acknowledged, but the response carried no id.
        fx.store
            .put_local_review(2, json!({"restaurant_id": 2, "name": "Me"}), 1_700_000_000_000)
            .unwrap();
        fx.stub.respond(
            Method::GET,
            REVIEWS_URL,
            200,
            &json!([
                {"id": 5, "restaurant_id": 2},
                {"id": 7, "restaurant_id": 2, "name": "Me"}
            ]),
        );

        let response = fx.router().with_ttl(Some(Duration::zero())).handle(get(REVIEWS_URL)).await;
        assert_eq!(response.source, ResponseSource::Network);
        let ids: Vec<Value> = response
            .json::<Vec<Value>>()
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(5), json!(7)]);

        let cached = fx.store.reviews_for(2).unwrap().unwrap();
        let cached_ids: Vec<Value> = cached.data.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(cached_ids, vec![json!(5), json!(7)]);
    }

    #[tokio::test]
    async fn test_empty_review_cache_goes_to_network_and_failure_is_500() {
        let fx = Fixture::new();
        fx.stub.fail(Method::GET, REVIEWS_URL);

        let response = fx.router().handle(get(REVIEWS_URL)).await;
        assert_eq!(response.status, 500);
        assert_eq!(fx.stub.request_count(), 1);
    }

    #[tokio::test]
    async fn test_writes_pass_through() {
        let fx = Fixture::new();
        let url = "http://localhost:1337/restaurants/2/?is_favorite=true";
        fx.stub.respond(Method::PUT, url, 200, &json!({"id": 2, "is_favorite": true}));

        let request = Request::new(Method::PUT, Url::parse(url).unwrap());
        let response = fx.router().handle(request).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::Network);
        assert!(fx.store.get_restaurants("2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assets_cached_on_success_only() {
        let fx = Fixture::new();
        let css = "http://localhost:8000/css/styles.css";
        let missing = "http://localhost:8000/nope.html";
        fx.stub.respond_raw(Method::GET, css, ApiResponse::new(200, "body {}"));
        let router = fx.router();

        assert_eq!(router.handle(get(css)).await.source, ResponseSource::Network);
        assert_eq!(router.handle(get(css)).await.source, ResponseSource::Cache);

        assert_eq!(router.handle(get(missing)).await.status, 404);
        assert_eq!(fx.assets.len().unwrap(), 1);
        // Asset failures say nothing about the review server.
        fx.stub.set_offline(true);
        router.handle(get(missing)).await;
        assert!(fx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_missing_photo_gets_placeholder() {
        let fx = Fixture::new();
        let placeholder = Url::parse("http://localhost:8000/img/ImageN-A.png").unwrap();
        fx.assets.put(&placeholder, b"png").unwrap();
        fx.stub.set_offline(true);
        let router = fx.router();

        let photo = router.handle(get("http://localhost:8000/img/7.jpg")).await;
        assert_eq!(photo.source, ResponseSource::Fallback);
        assert_eq!(photo.body, b"png");

        let script = router.handle(get("http://localhost:8000/js/main.js")).await;
        assert_eq!(script.status, 503);
    }
}
