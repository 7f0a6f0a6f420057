//! Wiring of the store, router, replayer and helper.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::{ApiClient, Endpoints, Transport};
use crate::cache::{AssetCache, CacheManager, CacheStatus};
use crate::config::Config;
use crate::helper::DbHelper;
use crate::router::RequestRouter;
use crate::sync::{Connectivity, QueueReplayer, SyncEvent, SyncReport, SyncTrigger, SyncWorker};

/// Everything one app instance needs, built from a [`Config`].
pub struct DineCache {
    config: Config,
    store: Arc<CacheManager>,
    router: Arc<RequestRouter>,
    replayer: Arc<QueueReplayer>,
    helper: DbHelper,
    connectivity: Connectivity,
    worker: Option<SyncWorker>,
}

impl DineCache {
    /// Open the cache and talk to the configured server over HTTP.
    pub fn open(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config.api_base_url)?;
        Self::with_transport(config, Arc::new(client))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let api_port = config.api_port()?;
        let store = Arc::new(
            CacheManager::open(cache_dir.clone())
                .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?,
        );
        let assets = Arc::new(AssetCache::open(&cache_dir)?);
        let connectivity = Connectivity::new();

        let router = Arc::new(
            RequestRouter::new(
                Arc::clone(&store),
                assets,
                Arc::clone(&transport),
                connectivity.clone(),
                api_port,
            )
            .with_ttl(config.cache_ttl())
            .with_offline_mode(config.offline_mode),
        );
        let replayer = Arc::new(
            QueueReplayer::new(Arc::clone(&store), transport, connectivity.clone())
                .with_offline_mode(config.offline_mode),
        );
        let helper = DbHelper::new(
            Arc::clone(&router),
            Arc::clone(&store),
            Arc::clone(&replayer),
            Endpoints::new(&config.api_base_url),
        );

        debug!(cache_dir = %cache_dir.display(), api_port, offline = config.offline_mode, "Cache opened");
        Ok(Self {
            config,
            store,
            router,
            replayer,
            helper,
            connectivity,
            worker: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn helper(&self) -> &DbHelper {
        &self.helper
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    pub fn store(&self) -> &CacheManager {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Replay the queue now and wait for the result.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.replayer.replay().await
    }

    /// Start replaying in the background. Writes made through the helper
    /// afterwards wake the worker instead of replaying inline.
    pub fn start_sync_worker(&mut self, events: mpsc::Sender<SyncEvent>) -> SyncTrigger {
        if let Some(ref worker) = self.worker {
            return worker.trigger();
        }
        let worker = SyncWorker::spawn(
            Arc::clone(&self.replayer),
            self.config.sync_interval(),
            events,
        );
        let trigger = worker.trigger();
        self.helper.set_sync_trigger(trigger.clone());
        self.worker = Some(worker);
        trigger
    }

    pub fn status(&self) -> Result<CacheStatus> {
        self.store.status()
    }

    /// Drop cached restaurants and reviews. Queued writes are kept.
    pub fn clear_cache(&self) -> Result<()> {
        info!("Clearing cached data");
        self.store.clear()
    }

    pub async fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::StubTransport;
    use reqwest::Method;
    use serde_json::json;

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_reads_and_writes_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubTransport::new());
        stub.respond(
            Method::GET,
            "http://localhost:1337/restaurants",
            200,
            &json!([{"id": 1, "name": "Katz's", "is_favorite": false}]),
        );
        let cache = DineCache::with_transport(config(&dir), stub.clone()).unwrap();

        let list = cache.helper().fetch_restaurants().await.unwrap();
        assert_eq!(list.len(), 1);

        stub.set_offline(true);
        cache.helper().update_favorite_selection(1, true).await.unwrap();
        let list = cache.helper().fetch_restaurants().await.unwrap();
        assert!(list[0].is_favorite);
        assert!(!cache.connectivity().is_online());

        let status = cache.status().unwrap();
        assert_eq!(status.queued, 1);
        assert_eq!(status.restaurants, 1);
    }

    #[tokio::test]
    async fn test_worker_takes_over_replays() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubTransport::new());
        let put_url = "http://localhost:1337/restaurants/3/?is_favorite=true";
        stub.respond(Method::PUT, put_url, 200, &json!({}));
        let mut cache = DineCache::with_transport(config(&dir), stub.clone()).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        cache.start_sync_worker(tx);
        // Startup pass.
        assert!(matches!(rx.recv().await, Some(SyncEvent::Completed(_))));

        cache.helper().update_favorite_selection(3, true).await.unwrap();
        match rx.recv().await {
            Some(SyncEvent::Completed(report)) => assert_eq!(report.replayed, 1),
            other => panic!("unexpected event {:?}", other),
        }
        cache.shutdown().await;
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.api_base_url = "not a url".to_string();
        let result = DineCache::with_transport(config, Arc::new(StubTransport::new()));
        assert!(result.is_err());
    }
}
