use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::cache::{CacheManager, ReviewRecord};
use crate::models::QueuedRequest;

use super::Connectivity;

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub replayed: usize,
    pub dropped: usize,
    pub remaining: usize,
    /// Why the pass stopped before the queue was empty.
    pub interrupted: Option<String>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none() && self.remaining == 0
    }
}

/// Sends queued writes to the server, oldest first.
pub struct QueueReplayer {
    store: Arc<CacheManager>,
    transport: Arc<dyn Transport>,
    connectivity: Connectivity,
    offline_mode: bool,
    // One pass at a time; a second caller sees the queue the first one left.
    running: Mutex<()>,
}

impl QueueReplayer {
    pub fn new(
        store: Arc<CacheManager>,
        transport: Arc<dyn Transport>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
            offline_mode: false,
            running: Mutex::new(()),
        }
    }

    pub fn with_offline_mode(mut self, offline_mode: bool) -> Self {
        self.offline_mode = offline_mode;
        self
    }

    /// Replay until the queue is empty or a transient failure stops the pass.
    ///
    /// - invalid entries (no url or method, or a POST without a body) are
    ///   deleted unsent
    /// - a success, or a followed redirect, deletes the entry
    /// - a transient failure (unreachable, 408, 429, 5xx) leaves the entry
    ///   queued and ends the pass
    /// - any other rejection deletes the entry so it cannot block the queue
    pub async fn replay(&self) -> Result<SyncReport> {
        let _running = self.running.lock().await;
        let mut report = SyncReport::default();

        if self.offline_mode {
            report.remaining = self.store.queue_len()?;
            report.interrupted = Some("offline mode".to_string());
            return Ok(report);
        }

        while let Some(op) = self.store.first_queued()? {
            let Some(request) = Self::to_request(&op.data) else {
                warn!(id = op.id, url = %op.data.url, method = %op.data.method, "Dropping invalid queued request");
                self.store.delete_queued(op.id)?;
                report.dropped += 1;
                continue;
            };

            info!(id = op.id, method = %request.method, url = %request.url, "Replaying queued request");
            let result = self
                .transport
                .send(&request)
                .await
                .and_then(ApiResponse::error_for_status);

            match result {
                Ok(response) => {
                    self.connectivity.mark_online();
                    self.store.delete_queued(op.id)?;
                    self.acknowledge(&op.data, &response);
                    report.replayed += 1;
                }
                Err(e) if e.is_transient() => {
                    if e.is_connectivity() {
                        self.connectivity.mark_offline();
                    }
                    warn!(id = op.id, error = %e, "Replay interrupted, request stays queued");
                    report.interrupted = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    self.connectivity.mark_online();
                    warn!(id = op.id, error = %e, "Server rejected queued request, dropping it");
                    self.store.delete_queued(op.id)?;
                    report.dropped += 1;
                }
            }
        }

        report.remaining = self.store.queue_len()?;
        debug!(?report, "Replay pass finished");
        Ok(report)
    }

    fn to_request(data: &QueuedRequest) -> Option<ApiRequest> {
        if !data.is_valid() {
            return None;
        }
        let method = Method::from_bytes(data.method.trim().to_ascii_uppercase().as_bytes()).ok()?;
        let mut request = ApiRequest::new(method, data.url.trim());
        request.body = data.body.clone();
        Some(request)
    }

    /// Fold the server's answer back into the cache. A replayed review
    /// replaces the placeholder cached when it was written.
    fn acknowledge(&self, data: &QueuedRequest, response: &ApiResponse) {
        let Some(local_id) = data.local_review_id else {
            return;
        };
        let server_copy = response
            .json::<Value>()
            .ok()
            .and_then(|value| ReviewRecord::from_server(value, None));

        match server_copy {
            Some(record) => {
                let server_id = record.id;
                if let Err(e) = self.store.replace_review(local_id, record) {
                    warn!(local_id, error = %e, "Failed to replace local review");
                } else {
                    debug!(local_id, server_id, "Local review replaced by server copy");
                }
            }
            None => debug!(local_id, "Server answer has no review id, keeping local copy"),
        }
    }
}
