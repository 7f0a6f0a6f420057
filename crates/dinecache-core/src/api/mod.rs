//! REST API access for the restaurant review server.
//!
//! This module provides the `Transport` seam the router and the queue
//! replayer talk to, the reqwest-backed `ApiClient` implementing it, and
//! `Endpoints` for building request URLs.
//!
//! The server needs no authentication: reads are plain GETs, favorites are
//! toggled with `PUT /restaurants/{id}/?is_favorite={bool}` and reviews are
//! created with `POST /reviews`.

pub mod client;
pub mod endpoints;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transport;

pub use client::ApiClient;
pub use endpoints::Endpoints;
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, Transport};
