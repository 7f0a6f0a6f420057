//! The interception layer between pages and the network.
//!
//! Every request the app makes goes through [`RequestRouter::handle`]. API
//! reads are answered from the local store when it has fresh data, refreshed
//! from the network when it is stale, and answered from the stale copy when
//! the network is down. Writes pass through untouched; the helper queues
//! them when they fail. Static assets use a separate cache-first store.

pub mod handler;
pub mod route;

pub use handler::{RequestRouter, PLACEHOLDER_IMAGE};
pub use route::{classify, Request, Response, ResponseSource, Route, FETCH_ERROR_BODY};
