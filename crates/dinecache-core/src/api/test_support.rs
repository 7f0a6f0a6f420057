//! Test utilities for code that talks to the review server.
//!
//! [`StubTransport`] is a deterministic stand-in for [`ApiClient`]: it
//! answers from scripted replies and records every request it receives, so
//! routing and replay logic can be tested without a running server.
//!
//! [`ApiClient`]: super::ApiClient

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::{ApiError, ApiRequest, ApiResponse, Transport};

#[derive(Debug, Clone)]
enum StubReply {
    Response(ApiResponse),
    Unreachable,
}

#[derive(Default)]
struct StubState {
    replies: HashMap<(Method, String), VecDeque<StubReply>>,
    offline: bool,
    log: Vec<ApiRequest>,
}

/// Scripted `Transport`.
///
/// Replies are matched on method and exact URL. Several replies for the
/// same request are used in order, and the last one keeps answering.
/// Requests with no scripted reply get a 404.
#[derive(Default)]
pub struct StubTransport {
    state: Mutex<StubState>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, url: &str, reply: StubReply) {
        let mut state = self.state.lock().unwrap();
        state
            .replies
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Script a JSON reply.
    pub fn respond(&self, method: Method, url: &str, status: u16, body: &Value) {
        self.push(
            method,
            url,
            StubReply::Response(ApiResponse::new(status, body.to_string())),
        );
    }

    /// Script a raw reply.
    pub fn respond_raw(&self, method: Method, url: &str, response: ApiResponse) {
        self.push(method, url, StubReply::Response(response));
    }

    /// Script a connection failure.
    pub fn fail(&self, method: Method, url: &str) {
        self.push(method, url, StubReply::Unreachable);
    }

    /// While offline every request fails, scripted or not.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(request.clone());
        if state.offline {
            return Err(ApiError::Unreachable(request.url.clone()));
        }

        let key = (request.method.clone(), request.url.clone());
        let reply = match state.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(StubReply::Response(response)) => Ok(response),
            Some(StubReply::Unreachable) => Err(ApiError::Unreachable(request.url.clone())),
            None => Ok(ApiResponse::new(404, "Not Found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replies_in_order_then_sticky() {
        let stub = StubTransport::new();
        stub.fail(Method::GET, "http://x/a");
        stub.respond(Method::GET, "http://x/a", 200, &json!([1]));

        let request = ApiRequest::get("http://x/a");
        assert!(stub.send(&request).await.is_err());
        assert_eq!(stub.send(&request).await.unwrap().status, 200);
        assert_eq!(stub.send(&request).await.unwrap().status, 200);
        assert_eq!(stub.request_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_is_404_and_offline_fails() {
        let stub = StubTransport::new();
        assert_eq!(stub.send(&ApiRequest::get("http://x/b")).await.unwrap().status, 404);
        stub.set_offline(true);
        assert!(stub.send(&ApiRequest::get("http://x/b")).await.is_err());
    }
}
