//! Data models for the review API.
//!
//! This module contains the records the app caches and queues:
//!
//! - `Restaurant`, `LatLng`: restaurant documents served by `/restaurants`
//! - `Review`, `NewReview`: reviews served by `/reviews`
//! - `QueuedRequest`, `QueuedOperation`: writes waiting to be replayed
//! - `FavoriteUpdate`, `MapMarker`: small values handed back to the pages

pub mod queued;
pub mod restaurant;
pub mod review;
mod wire;

pub(crate) use wire::value_to_i64;

pub use queued::{QueuedOperation, QueuedRequest};
pub use restaurant::{FavoriteUpdate, LatLng, MapMarker, Restaurant};
pub use review::{NewReview, Review, MAX_RATING};
