//! Offline-first data access for the restaurant review app.
//!
//! The crate fetches restaurants and reviews from the review API, keeps a
//! local copy for offline use and queues writes (favorite toggles, new
//! reviews) until the server can be reached again.
//!
//! - [`cache`]: the local store, a read cache plus a write-ahead queue
//! - [`router`]: decides per request whether to answer from cache or network
//! - [`sync`]: replays the queued writes against the server
//! - [`helper`]: the data access API used by the pages
//! - [`api`]: the HTTP transport and its error type

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod helper;
pub mod models;
pub mod router;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use context::DineCache;
pub use helper::{DbHelper, HelperError, WarmReport};
