//! Cache for static files requested outside the API.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Versioned name of the asset cache; a new version starts empty.
pub const ASSET_CACHE_NAME: &str = "mws-restaurant-cache-v3";

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetEntry {
    file: String,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AssetIndex {
    #[serde(default)]
    next_file: u64,
    #[serde(default)]
    entries: BTreeMap<String, AssetEntry>,
}

/// Response bodies keyed by URL, one file per body plus an index.
pub struct AssetCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl AssetCache {
    pub fn open(cache_dir: &std::path::Path) -> Result<Self> {
        let dir = cache_dir.join("assets").join(ASSET_CACHE_NAME);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create asset cache: {}", dir.display()))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Fragments never reach the server, so they do not distinguish entries.
    fn key(url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    fn read_index(&self) -> Result<AssetIndex> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(AssetIndex::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read asset index")?;
        serde_json::from_str(&contents).context("Failed to parse asset index")
    }

    fn write_index(&self, index: &AssetIndex) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(index)?)
            .context("Failed to write asset index")?;
        std::fs::rename(&tmp, &path).context("Failed to replace asset index")?;
        Ok(())
    }

    pub fn match_url(&self, url: &Url) -> Result<Option<Vec<u8>>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Asset cache lock poisoned"))?;
        let index = self.read_index()?;
        let Some(entry) = index.entries.get(&Self::key(url)) else {
            return Ok(None);
        };
        match std::fs::read(self.dir.join(&entry.file)) {
            Ok(body) => Ok(Some(body)),
            Err(e) => {
                warn!(url = %url, error = %e, "Asset indexed but unreadable, treating as miss");
                Ok(None)
            }
        }
    }

    pub fn put(&self, url: &Url, body: &[u8]) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Asset cache lock poisoned"))?;
        let mut index = self.read_index()?;
        let key = Self::key(url);

        let file = match index.entries.get(&key) {
            Some(existing) => existing.file.clone(),
            None => {
                index.next_file += 1;
                format!("{}.bin", index.next_file)
            }
        };
        std::fs::write(self.dir.join(&file), body)
            .with_context(|| format!("Failed to cache asset: {}", key))?;
        index.entries.insert(
            key,
            AssetEntry {
                file,
                cached_at: Utc::now(),
            },
        );
        self.write_index(&index)
    }

    pub fn len(&self) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Asset cache lock poisoned"))?;
        Ok(self.read_index()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path()).unwrap();
        let url = Url::parse("http://localhost:8000/css/styles.css").unwrap();

        assert!(cache.match_url(&url).unwrap().is_none());
        cache.put(&url, b"body { }").unwrap();
        assert_eq!(cache.match_url(&url).unwrap().unwrap(), b"body { }");

        let with_fragment = Url::parse("http://localhost:8000/css/styles.css#top").unwrap();
        assert!(cache.match_url(&with_fragment).unwrap().is_some());
    }

    #[test]
    fn test_put_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path()).unwrap();
        let url = Url::parse("http://localhost:8000/index.html").unwrap();
        assert!(cache.is_empty().unwrap());

        cache.put(&url, b"v1").unwrap();
        cache.put(&url, b"v2").unwrap();
        assert_eq!(cache.match_url(&url).unwrap().unwrap(), b"v2");
        assert_eq!(cache.len().unwrap(), 1);
        assert!(!cache.is_empty().unwrap());
    }

    #[test]
    fn test_missing_body_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path()).unwrap();
        let url = Url::parse("http://localhost:8000/img/1.jpg").unwrap();
        cache.put(&url, b"jpeg").unwrap();

        let asset_dir = dir.path().join("assets").join(ASSET_CACHE_NAME);
        std::fs::remove_file(asset_dir.join("1.bin")).unwrap();
        assert!(cache.match_url(&url).unwrap().is_none());
    }
}
