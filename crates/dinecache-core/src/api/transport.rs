//! The seam between request handling and the network.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ApiError;

/// A request bound for the review server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Whatever the server answered, success or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// The response came from a different URL than the one requested.
    pub redirected: bool,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            redirected: false,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    /// Turn a non-success status into the matching error. A followed
    /// redirect counts as success.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() || self.redirected {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.text()))
        }
    }
}

/// Sends requests to the review server.
///
/// Any HTTP status is returned as `Ok`; `Err` means no usable answer was
/// received at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_for_status() {
        assert!(ApiResponse::new(201, "{}").error_for_status().is_ok());
        assert!(matches!(
            ApiResponse::new(500, "boom").error_for_status(),
            Err(ApiError::ServerError(_))
        ));

        let mut redirected = ApiResponse::new(404, "");
        redirected.redirected = true;
        assert!(redirected.error_for_status().is_ok());
    }

    #[test]
    fn test_json_body() {
        let response = ApiResponse::new(200, r#"[{"id": 1}]"#);
        let value: Value = response.json().unwrap();
        assert_eq!(value, json!([{"id": 1}]));
        assert!(ApiResponse::new(200, "nope").json::<Value>().is_err());
    }
}
