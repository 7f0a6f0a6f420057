//! API client for communicating with the restaurant review REST API.
//!
//! This module provides the `ApiClient` struct, the reqwest implementation
//! of [`Transport`].

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};
use url::Url;

use super::{ApiError, ApiRequest, ApiResponse, Endpoints, Transport};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the review server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoints: Endpoints,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(base_url),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// First wait after a 429. Each further retry waits twice as long.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send once, without retrying.
    async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let requested = Url::parse(&request.url)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid URL {}: {}", request.url, e)))?;

        let mut builder = self
            .client
            .request(request.method.clone(), requested.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let redirected = response.url() != &requested;
        let body = response.bytes().await?.to_vec();
        debug!(method = %request.method, url = %request.url, status, "Response received");

        Ok(ApiResponse {
            status,
            redirected,
            body,
        })
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.send_once(request).await?;
            if response.status != 429 {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = %request.url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n[]";
    const TOO_MANY: &str = "HTTP/1.1 429 Too Many Requests\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const MOVED: &str = "HTTP/1.1 302 Found\r\nLocation: /final\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    /// Serve canned responses in order, repeating the last one. Returns the
    /// base URL and the request lines seen.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut served = 0;
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head);
                let line = text.lines().next().unwrap_or_default().to_string();
                log.lock().unwrap().push(line);

                let reply = responses[served.min(responses.len() - 1)];
                served += 1;
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (base, seen)
    }

    #[test]
    fn test_client_keeps_base_url() {
        let client = ApiClient::new("http://localhost:1337/").unwrap();
        assert_eq!(client.endpoints().base_url(), "http://localhost:1337");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let client = ApiClient::new("http://localhost:1337").unwrap();
        let result = client.send(&ApiRequest::get("not a url")).await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried_with_backoff() {
        let (base, seen) = serve(vec![TOO_MANY, TOO_MANY, OK]).await;
        let client = ApiClient::new(&base)
            .unwrap()
            .with_initial_backoff(Duration::from_millis(20));

        let started = std::time::Instant::now();
        let response = client
            .send(&ApiRequest::get(format!("{}/restaurants", base)))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(!response.redirected);
        assert_eq!(seen.lock().unwrap().len(), 3);
        // 20ms, then 40ms.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let (base, seen) = serve(vec![TOO_MANY]).await;
        let client = ApiClient::new(&base)
            .unwrap()
            .with_initial_backoff(Duration::from_millis(1));

        let result = client.send(&ApiRequest::get(format!("{}/restaurants", base))).await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(seen.lock().unwrap().len(), MAX_RATE_LIMIT_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_followed_redirect_is_reported() {
        let (base, seen) = serve(vec![MOVED, OK]).await;
        let client = ApiClient::new(&base).unwrap();

        let response = client
            .send(&ApiRequest::get(format!("{}/restaurants", base)))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.redirected);
        assert_eq!(response.body, b"[]");
        let lines = seen.lock().unwrap().clone();
        assert_eq!(lines, vec!["GET /restaurants HTTP/1.1", "GET /final HTTP/1.1"]);
    }
}
