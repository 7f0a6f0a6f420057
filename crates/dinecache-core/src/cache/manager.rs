use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{value_to_i64, QueuedOperation, QueuedRequest};

/// Database name, kept in the metadata file.
pub const DB_NAME: &str = "restaurant-review";

/// Current schema version. Opening an older store upgrades it in place.
pub const DB_VERSION: u32 = 3;

/// Restaurant store key under which the full list is cached.
pub const ALL_RESTAURANTS_KEY: &str = "-1";

const RESTAURANTS_STORE: &str = "restaurants";
const REVIEWS_STORE: &str = "reviews";
const QUEUE_STORE: &str = "queuedData";
const META_FILE: &str = "meta";

type RestaurantTable = BTreeMap<String, RestaurantRecord>;
type ReviewTable = BTreeMap<i64, ReviewRecord>;
type QueueTable = BTreeMap<u64, QueuedRequest>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// `None` means cached data never goes stale.
    pub fn is_stale(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => Utc::now() - self.cached_at >= ttl,
            None => false,
        }
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RestaurantRecord {
    id: String,
    data: Value,
    // Records written before timestamps existed count as stale.
    #[serde(default = "epoch")]
    cached_at: DateTime<Utc>,
}

/// A row of the `reviews` store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub restaurant_id: i64,
    pub data: Value,
    #[serde(default = "epoch")]
    pub cached_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(id: i64, restaurant_id: i64, data: Value) -> Self {
        Self {
            id,
            restaurant_id,
            data,
            cached_at: Utc::now(),
        }
    }

    /// Build a record from a review document the server sent. Documents
    /// without an id cannot be keyed and are skipped.
    pub fn from_server(data: Value, fallback_restaurant_id: Option<i64>) -> Option<Self> {
        let id = data.get("id").and_then(value_to_i64)?;
        let restaurant_id = data
            .get("restaurant_id")
            .and_then(value_to_i64)
            .or(fallback_restaurant_id)?;
        Some(Self::new(id, restaurant_id, data))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Meta {
    name: String,
    version: u32,
    #[serde(default = "first_queue_id")]
    next_queue_id: u64,
}

fn first_queue_id() -> u64 {
    1
}

/// Counts and ages shown in the status output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatus {
    pub restaurants: usize,
    pub reviews: usize,
    /// Reviews written locally that the server has not acknowledged yet.
    pub pending_reviews: usize,
    pub queued: usize,
    pub restaurants_cached: Option<String>,
}

impl CacheStatus {
    pub fn restaurants_age(&self) -> String {
        self.restaurants_cached
            .clone()
            .unwrap_or_else(|| "never".to_string())
    }
}

pub struct CacheManager {
    cache_dir: PathBuf,
    // Serialises read-modify-write cycles on the store files.
    lock: Mutex<()>,
}

impl CacheManager {
    /// Open (creating or upgrading as needed) the store in `cache_dir`.
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let manager = Self {
            cache_dir,
            lock: Mutex::new(()),
        };

        let meta = manager.read_meta()?;
        let old_version = meta.as_ref().map_or(0, |m| m.version);
        if old_version > DB_VERSION {
            bail!(
                "Cache schema version {} is newer than supported version {}",
                old_version,
                DB_VERSION
            );
        }
        if old_version < DB_VERSION {
            manager.upgrade(old_version)?;
            let next_queue_id = meta.map_or_else(first_queue_id, |m| m.next_queue_id);
            manager.write_meta(&Meta {
                name: DB_NAME.to_string(),
                version: DB_VERSION,
                next_queue_id,
            })?;
        }

        Ok(manager)
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Upgrade steps fall through: a fresh store runs every one of them.
    fn upgrade(&self, old_version: u32) -> Result<()> {
        info!(from = old_version, to = DB_VERSION, "Upgrading cache schema");
        if old_version < 1 {
            self.create_store(RESTAURANTS_STORE, &RestaurantTable::new())?;
        }
        if old_version < 2 {
            self.create_store(REVIEWS_STORE, &ReviewTable::new())?;
        }
        if old_version < 3 {
            self.create_store(QUEUE_STORE, &QueueTable::new())?;
        }
        Ok(())
    }

    fn create_store<T: Serialize>(&self, name: &str, empty: &T) -> Result<()> {
        if self.store_path(name).exists() {
            debug!(store = name, "Object store already present");
            return Ok(());
        }
        self.write_json(name, empty)
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))
    }

    fn read_meta(&self) -> Result<Option<Meta>> {
        let path = self.store_path(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read cache metadata")?;
        let meta = serde_json::from_str(&contents).context("Failed to parse cache metadata")?;
        Ok(Some(meta))
    }

    fn write_meta(&self, meta: &Meta) -> Result<()> {
        self.write_json(META_FILE, meta)
    }

    fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.store_path(name);
        if !path.exists() {
            bail!("Object store not found: {}", name);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse cache file: {}", name))
    }

    /// Write through a temp file so a crash never leaves half a document.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.store_path(name);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache file: {}", name))?;
        Ok(())
    }

    fn modify_table<T, R>(&self, name: &str, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.guard()?;
        let mut table: T = self.read_table(name)?;
        let result = f(&mut table);
        self.write_json(name, &table)?;
        Ok(result)
    }

    // ===== Restaurants =====

    pub fn get_restaurants(&self, key: &str) -> Result<Option<CachedData<Value>>> {
        let _guard = self.guard()?;
        let table: RestaurantTable = self.read_table(RESTAURANTS_STORE)?;
        Ok(table.get(key).map(|record| CachedData {
            data: record.data.clone(),
            cached_at: record.cached_at,
        }))
    }

    /// Store `data` under `key`, replacing whatever was cached there.
    pub fn put_restaurants(&self, key: &str, data: Value) -> Result<()> {
        self.modify_table(RESTAURANTS_STORE, |table: &mut RestaurantTable| {
            table.insert(
                key.to_string(),
                RestaurantRecord {
                    id: key.to_string(),
                    data,
                    cached_at: Utc::now(),
                },
            );
        })
    }

    /// Patch the cached document under `key` in place, keeping its
    /// timestamp. Returns false when nothing is cached there or `patch`
    /// reports no change.
    pub fn update_restaurants(
        &self,
        key: &str,
        patch: impl FnOnce(&mut Value) -> bool,
    ) -> Result<bool> {
        let _guard = self.guard()?;
        let mut table: RestaurantTable = self.read_table(RESTAURANTS_STORE)?;
        let changed = match table.get_mut(key) {
            Some(record) => patch(&mut record.data),
            None => false,
        };
        if changed {
            self.write_json(RESTAURANTS_STORE, &table)?;
        }
        Ok(changed)
    }

    // ===== Reviews =====

    /// Cached review documents for a restaurant, ordered by id. The age is
    /// that of the oldest record.
    pub fn reviews_for(&self, restaurant_id: i64) -> Result<Option<CachedData<Vec<Value>>>> {
        let _guard = self.guard()?;
        let table: ReviewTable = self.read_table(REVIEWS_STORE)?;
        let records: Vec<&ReviewRecord> = table
            .values()
            .filter(|r| r.restaurant_id == restaurant_id)
            .collect();

        let Some(oldest) = records.iter().map(|r| r.cached_at).min() else {
            return Ok(None);
        };
        Ok(Some(CachedData {
            data: records.into_iter().map(|r| r.data.clone()).collect(),
            cached_at: oldest,
        }))
    }

    pub fn put_review(&self, record: ReviewRecord) -> Result<()> {
        self.put_reviews(vec![record]).map(|_| ())
    }

    pub fn put_reviews(&self, records: Vec<ReviewRecord>) -> Result<usize> {
        self.modify_table(REVIEWS_STORE, |table: &mut ReviewTable| {
            let count = records.len();
            for record in records {
                table.insert(record.id, record);
            }
            count
        })
    }

    /// Make the server's list the cached reviews of a restaurant. Local
    /// placeholders survive only while their POST is still queued. Returns
    /// the documents of those placeholders, oldest first.
    pub fn sync_reviews(&self, restaurant_id: i64, records: Vec<ReviewRecord>) -> Result<Vec<Value>> {
        let _guard = self.guard()?;
        let queue: QueueTable = self.read_table(QUEUE_STORE)?;
        let mut table: ReviewTable = self.read_table(REVIEWS_STORE)?;

        let queued_ids: Vec<i64> = queue.values().filter_map(|r| r.local_review_id).collect();
        let before = table.len();
        table.retain(|id, record| {
            record.restaurant_id != restaurant_id || queued_ids.contains(id)
        });
        let pending: Vec<Value> = table
            .values()
            .filter(|r| r.restaurant_id == restaurant_id)
            .map(|r| r.data.clone())
            .collect();
        debug!(
            restaurant_id,
            removed = before - table.len(),
            pending = pending.len(),
            "Replacing cached reviews"
        );

        for record in records {
            table.insert(record.id, record);
        }
        self.write_json(REVIEWS_STORE, &table)?;
        Ok(pending)
    }

    /// Cache a review the server has not seen yet. It is keyed by the
    /// creation time in milliseconds, bumped past any key already taken.
    pub fn put_local_review(&self, restaurant_id: i64, data: Value, now_ms: i64) -> Result<i64> {
        self.modify_table(REVIEWS_STORE, |table: &mut ReviewTable| {
            let mut id = now_ms;
            while table.contains_key(&id) {
                id += 1;
            }
            table.insert(id, ReviewRecord::new(id, restaurant_id, data));
            id
        })
    }

    /// Swap a local placeholder for the server's copy of the same review.
    pub fn replace_review(&self, local_id: i64, record: ReviewRecord) -> Result<()> {
        self.modify_table(REVIEWS_STORE, |table: &mut ReviewTable| {
            if table.remove(&local_id).is_none() {
                warn!(local_id, "Local review placeholder already gone");
            }
            table.insert(record.id, record);
        })
    }

    pub fn delete_review(&self, id: i64) -> Result<bool> {
        self.modify_table(REVIEWS_STORE, |table: &mut ReviewTable| {
            table.remove(&id).is_some()
        })
    }

    // ===== Queued requests =====

    /// Append a request to the queue. Keys strictly increase and are never
    /// handed out twice, even after the request has been deleted.
    pub fn enqueue(&self, request: QueuedRequest) -> Result<u64> {
        let _guard = self.guard()?;
        let mut meta = self
            .read_meta()?
            .ok_or_else(|| anyhow::anyhow!("Cache metadata missing"))?;
        let mut table: QueueTable = self.read_table(QUEUE_STORE)?;

        let after_last = table.keys().next_back().map_or(1, |k| k + 1);
        let id = meta.next_queue_id.max(after_last);

        // Burn the key before using it.
        meta.next_queue_id = id + 1;
        self.write_meta(&meta)?;

        table.insert(id, request);
        self.write_json(QUEUE_STORE, &table)?;
        debug!(id, "Queued request");
        Ok(id)
    }

    pub fn first_queued(&self) -> Result<Option<QueuedOperation>> {
        let _guard = self.guard()?;
        let table: QueueTable = self.read_table(QUEUE_STORE)?;
        Ok(table
            .into_iter()
            .next()
            .map(|(id, data)| QueuedOperation { id, data }))
    }

    pub fn queued(&self) -> Result<Vec<QueuedOperation>> {
        let _guard = self.guard()?;
        let table: QueueTable = self.read_table(QUEUE_STORE)?;
        Ok(table
            .into_iter()
            .map(|(id, data)| QueuedOperation { id, data })
            .collect())
    }

    pub fn delete_queued(&self, id: u64) -> Result<bool> {
        self.modify_table(QUEUE_STORE, |table: &mut QueueTable| table.remove(&id).is_some())
    }

    pub fn queue_len(&self) -> Result<usize> {
        let _guard = self.guard()?;
        let table: QueueTable = self.read_table(QUEUE_STORE)?;
        Ok(table.len())
    }

    // ===== Maintenance =====

    pub fn status(&self) -> Result<CacheStatus> {
        let _guard = self.guard()?;
        let restaurants: RestaurantTable = self.read_table(RESTAURANTS_STORE)?;
        let reviews: ReviewTable = self.read_table(REVIEWS_STORE)?;
        let queue: QueueTable = self.read_table(QUEUE_STORE)?;

        let restaurants_cached = restaurants.get(ALL_RESTAURANTS_KEY).map(|record| {
            CachedData {
                data: (),
                cached_at: record.cached_at,
            }
            .age_display()
        });

        Ok(CacheStatus {
            restaurants: restaurants.len(),
            reviews: reviews.len(),
            pending_reviews: reviews
                .values()
                .filter(|r| r.data.get("id").is_none())
                .count(),
            queued: queue.len(),
            restaurants_cached,
        })
    }

    /// Drop cached restaurants and reviews. Queued writes are kept.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;
        self.write_json(RESTAURANTS_STORE, &RestaurantTable::new())?;
        self.write_json(REVIEWS_STORE, &ReviewTable::new())?;
        info!("Cleared cached restaurants and reviews");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
