//! Data access for the presentation layer.
//!
//! `DbHelper` is what pages call. Reads are issued as ordinary requests
//! through the [`RequestRouter`], so they get the same cache handling a page
//! fetch would. Writes update the cache first, go into the queue, and are
//! then replayed.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::Endpoints;
use crate::cache::{CacheManager, ALL_RESTAURANTS_KEY};
use crate::models::{
    FavoriteUpdate, MapMarker, NewReview, QueuedRequest, Restaurant, Review, MAX_RATING,
};
use crate::router::{Request, RequestRouter};
use crate::sync::{QueueReplayer, SyncTrigger};

/// Maximum concurrent requests while warming the cache.
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Filter value that matches every cuisine or neighborhood.
pub const ANY_FILTER: &str = "all";

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("Request failed. Returned status of {status}")]
    RequestFailed { status: u16 },

    #[error("Restaurant does not exist")]
    RestaurantNotFound,

    #[error("No reviews yet!")]
    NoReviews,

    #[error("Invalid review: {0}")]
    InvalidReview(String),

    #[error("Invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Totals from [`DbHelper::warm_cache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub restaurants: usize,
    pub reviews: usize,
    pub failed: usize,
}

pub struct DbHelper {
    router: Arc<RequestRouter>,
    store: Arc<CacheManager>,
    replayer: Arc<QueueReplayer>,
    endpoints: Endpoints,
    trigger: Option<SyncTrigger>,
}

impl DbHelper {
    pub fn new(
        router: Arc<RequestRouter>,
        store: Arc<CacheManager>,
        replayer: Arc<QueueReplayer>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            router,
            store,
            replayer,
            endpoints,
            trigger: None,
        }
    }

    /// Hand replays to a running worker instead of running them inline.
    pub fn set_sync_trigger(&mut self, trigger: SyncTrigger) {
        self.trigger = Some(trigger);
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HelperError> {
        let response = self.router.handle(Request::get(url)?).await;
        if !response.is_success() {
            return Err(HelperError::RequestFailed {
                status: response.status,
            });
        }
        Ok(response.json()?)
    }

    // ===== Restaurants =====

    pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, HelperError> {
        self.get_json(&self.endpoints.restaurants_url()).await
    }

    /// One restaurant from its own endpoint.
    pub async fn fetch_restaurant(&self, id: i64) -> Result<Restaurant, HelperError> {
        match self.get_json(&self.endpoints.restaurant_url(id)).await {
            Err(HelperError::RequestFailed { .. }) => Err(HelperError::RestaurantNotFound),
            other => other,
        }
    }

    /// One restaurant, looked up in the full list.
    pub async fn fetch_restaurant_by_id(&self, id: i64) -> Result<Restaurant, HelperError> {
        self.fetch_restaurants()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(HelperError::RestaurantNotFound)
    }

    pub async fn fetch_restaurants_by_cuisine(
        &self,
        cuisine: &str,
    ) -> Result<Vec<Restaurant>, HelperError> {
        self.fetch_restaurants_by_cuisine_and_neighborhood(cuisine, ANY_FILTER)
            .await
    }

    pub async fn fetch_restaurants_by_neighborhood(
        &self,
        neighborhood: &str,
    ) -> Result<Vec<Restaurant>, HelperError> {
        self.fetch_restaurants_by_cuisine_and_neighborhood(ANY_FILTER, neighborhood)
            .await
    }

    /// `"all"` for either argument disables that filter.
    pub async fn fetch_restaurants_by_cuisine_and_neighborhood(
        &self,
        cuisine: &str,
        neighborhood: &str,
    ) -> Result<Vec<Restaurant>, HelperError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(restaurants
            .into_iter()
            .filter(|r| matches_filter(&r.cuisine_type, cuisine))
            .filter(|r| matches_filter(&r.neighborhood, neighborhood))
            .collect())
    }

    pub async fn fetch_neighborhoods(&self) -> Result<Vec<String>, HelperError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(unique_in_order(restaurants.iter().map(|r| r.neighborhood.as_str())))
    }

    pub async fn fetch_cuisines(&self) -> Result<Vec<String>, HelperError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(unique_in_order(restaurants.iter().map(|r| r.cuisine_type.as_str())))
    }

    // ===== Reviews =====

    pub async fn fetch_reviews_by_id(&self, restaurant_id: i64) -> Result<Vec<Review>, HelperError> {
        match self
            .get_json(&self.endpoints.reviews_for_url(restaurant_id))
            .await
        {
            Err(HelperError::RequestFailed { status }) => {
                debug!(restaurant_id, status, "No reviews available");
                Err(HelperError::NoReviews)
            }
            other => other,
        }
    }

    // ===== Writes =====

    /// Record a favorite toggle locally, queue it for the server, and try to
    /// send it. The last toggle wins.
    pub async fn update_favorite_selection(
        &self,
        id: i64,
        is_favorite: bool,
    ) -> Result<FavoriteUpdate, HelperError> {
        let in_list = self.store.update_restaurants(ALL_RESTAURANTS_KEY, |list| {
            let Some(items) = list.as_array_mut() else {
                return false;
            };
            let mut changed = false;
            for item in items.iter_mut().filter(|item| record_id(item) == Some(id)) {
                changed |= set_favorite(item, is_favorite);
            }
            changed
        })?;
        let single = self
            .store
            .update_restaurants(&id.to_string(), |record| set_favorite(record, is_favorite))?;
        debug!(id, is_favorite, in_list, single, "Favorite cached");

        let request = QueuedRequest::new("PUT", self.endpoints.favorite_url(id, is_favorite), None);
        let queue_id = self.store.enqueue(request)?;
        info!(id, is_favorite, queue_id, "Favorite queued");

        self.kick_replay().await;
        Ok(FavoriteUpdate {
            id,
            value: is_favorite,
        })
    }

    /// Store a new review so it shows up in the cached reviews right away,
    /// queue the POST, and try to send it.
    pub async fn save_review(
        &self,
        restaurant_id: i64,
        name: &str,
        rating: u8,
        comments: &str,
    ) -> Result<Review, HelperError> {
        if !(1..=MAX_RATING).contains(&rating) {
            return Err(HelperError::InvalidReview(format!(
                "rating must be between 1 and {}",
                MAX_RATING
            )));
        }
        if name.trim().is_empty() {
            return Err(HelperError::InvalidReview("name is required".to_string()));
        }

        let now_ms = Utc::now().timestamp_millis();
        let review = NewReview {
            restaurant_id,
            name: name.trim().to_string(),
            rating,
            comments: comments.trim().to_string(),
            created_at: now_ms,
        };
        let body = serde_json::to_value(&review)?;

        let local_id = self
            .store
            .put_local_review(restaurant_id, body.clone(), now_ms)?;
        let request = QueuedRequest::new("POST", self.endpoints.reviews_url(), Some(body))
            .for_local_review(local_id);
        let queue_id = self.store.enqueue(request)?;
        info!(restaurant_id, local_id, queue_id, "Review queued");

        self.kick_replay().await;
        Ok(review.to_review())
    }

    async fn kick_replay(&self) {
        if let Some(ref trigger) = self.trigger {
            if trigger.request() {
                return;
            }
            debug!("Sync worker gone, replaying inline");
        }
        match self.replayer.replay().await {
            Ok(report) if report.interrupted.is_some() => {
                debug!(?report, "Queued writes kept for later")
            }
            Ok(report) => debug!(?report, "Queued writes sent"),
            Err(e) => warn!(error = %e, "Replay failed"),
        }
    }

    // ===== Offline preparation =====

    /// Pull the list, every restaurant and every restaurant's reviews into
    /// the cache.
    pub async fn warm_cache(&self) -> Result<WarmReport, HelperError> {
        let restaurants = self.fetch_restaurants().await?;
        let ids: Vec<i64> = restaurants.iter().map(|r| r.id).collect();
        info!(count = ids.len(), "Warming cache");

        let mut report = WarmReport::default();
        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let restaurant = self.fetch_restaurant(id).await;
                let reviews = self.fetch_reviews_by_id(id).await;
                (id, restaurant, reviews)
            })
            .buffer_unordered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await;

        for (id, restaurant, reviews) in results {
            match restaurant {
                Ok(_) => report.restaurants += 1,
                Err(e) => {
                    warn!(restaurant_id = id, error = %e, "Failed to cache restaurant");
                    report.failed += 1;
                }
            }
            match reviews {
                Ok(list) => report.reviews += list.len(),
                Err(HelperError::NoReviews) => {}
                Err(e) => {
                    warn!(restaurant_id = id, error = %e, "Failed to cache reviews");
                    report.failed += 1;
                }
            }
        }

        debug!(?report, "Cache warmed");
        Ok(report)
    }
}

fn matches_filter(value: &str, filter: &str) -> bool {
    filter == ANY_FILTER || value == filter
}

fn unique_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for value in values {
        if !unique.iter().any(|seen| seen == value) {
            unique.push(value.to_string());
        }
    }
    unique
}

fn record_id(record: &Value) -> Option<i64> {
    record.get("id").and_then(crate::models::value_to_i64)
}

fn set_favorite(record: &mut Value, is_favorite: bool) -> bool {
    match record.as_object_mut() {
        Some(object) => {
            object.insert("is_favorite".to_string(), Value::Bool(is_favorite));
            true
        }
        None => false,
    }
}

// ===== URL and map helpers =====

pub fn url_for_restaurant(restaurant: &Restaurant) -> String {
    format!("./restaurant.html?id={}", restaurant.id)
}

pub fn image_url_for_restaurant(restaurant: &Restaurant) -> String {
    match restaurant.photograph.as_deref() {
        Some(photo) if !photo.is_empty() => format!("/img/{}.jpg", photo),
        _ => format!("/img/{}.jpg", restaurant.id),
    }
}

/// `None` when the restaurant has no coordinates.
pub fn map_marker_for_restaurant(restaurant: &Restaurant) -> Option<MapMarker> {
    let latlng = restaurant.latlng.as_ref()?;
    Some(MapMarker {
        lat: latlng.lat,
        lng: latlng.lng,
        title: restaurant.name.clone(),
        alt: format!("This is an image of the {} restaurant", restaurant.name),
        url: url_for_restaurant(restaurant),
    })
}
