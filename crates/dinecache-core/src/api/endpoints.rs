//! URL builders for the review API.

use crate::config::DEFAULT_API_BASE_URL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn restaurants_url(&self) -> String {
        format!("{}/restaurants", self.base_url)
    }

    pub fn restaurant_url(&self, id: i64) -> String {
        format!("{}/restaurants/{}", self.base_url, id)
    }

    pub fn favorite_url(&self, id: i64, is_favorite: bool) -> String {
        format!("{}/restaurants/{}/?is_favorite={}", self.base_url, id, is_favorite)
    }

    pub fn reviews_url(&self) -> String {
        format!("{}/reviews", self.base_url)
    }

    pub fn reviews_for_url(&self, restaurant_id: i64) -> String {
        format!("{}/reviews/?restaurant_id={}", self.base_url, restaurant_id)
    }
}
