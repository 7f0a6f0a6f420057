//! Local persistent store for offline data access.
//!
//! This module provides the `CacheManager`, a small versioned database
//! (`restaurant-review`, schema 3) with three object stores kept as JSON
//! documents in the cache directory:
//!
//! - `restaurants`: restaurant documents keyed by id, `"-1"` holding the list
//! - `reviews`: review documents keyed by id, looked up by `restaurant_id`
//! - `queuedData`: writes waiting to be replayed, keyed by an auto-increment id
//!
//! `AssetCache` keeps static files (pages, styles, images) for requests that
//! do not target the API.

pub mod assets;
pub mod manager;

pub use assets::AssetCache;
pub use manager::{
    CacheManager, CacheStatus, CachedData, ReviewRecord, ALL_RESTAURANTS_KEY, DB_NAME, DB_VERSION,
};
