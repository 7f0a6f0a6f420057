use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write waiting to be sent to the review API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QueuedRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub body: Option<Value>,
    /// Id of the locally cached placeholder a queued review POST stands for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_review_id: Option<i64>,
}

impl QueuedRequest {
    pub fn new(method: &str, url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            url: url.into(),
            method: method.to_ascii_uppercase(),
            body,
            local_review_id: None,
        }
    }

    pub fn for_local_review(mut self, local_id: i64) -> Self {
        self.local_review_id = Some(local_id);
        self
    }

    /// A request can be replayed when it names a url and a method, and a
    /// POST carries a body.
    pub fn is_valid(&self) -> bool {
        if self.url.trim().is_empty() || self.method.trim().is_empty() {
            return false;
        }
        !(self.method.eq_ignore_ascii_case("POST") && self.body.is_none())
    }
}

/// A queued request together with its auto-increment key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QueuedOperation {
    pub id: u64,
    pub data: QueuedRequest,
}
