//! Dashboard cache: freshness-tiered payload storage over a key/value store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::storage::KeyValueStore;
use super::traits::{
  CacheEntry, CacheLookup, CacheStats, Clock, FreshnessWindows, SystemClock,
};

/// Settings for the dashboard cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Prefix for every storage key owned by the cache
  pub namespace: String,
  /// Records written under any other version are treated as absent
  pub schema_version: String,
  pub windows: FreshnessWindows,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      namespace: "shoplens-cache:".to_string(),
      schema_version: "v1".to_string(),
      windows: FreshnessWindows::default(),
    }
  }
}

/// Invalidation notices published to cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  Removed(CacheKey),
  Cleared,
}

/// On-disk record layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
  data: Value,
  /// Milliseconds since the Unix epoch
  timestamp: i64,
  version: String,
}

/// Cache of the last known-good payload per request key.
///
/// Construct once with [`DashboardCache::init`] and share the returned `Arc`
/// with every query. Storage failures never reach callers: reads degrade to
/// misses and writes are logged and dropped.
pub struct DashboardCache {
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  settings: CacheSettings,
  events: broadcast::Sender<CacheEvent>,
}

impl DashboardCache {
  pub fn new(store: Arc<dyn KeyValueStore>, settings: CacheSettings) -> Self {
    Self::with_clock(store, Arc::new(SystemClock), settings)
  }

  pub fn with_clock(
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
  ) -> Self {
    let (events, _) = broadcast::channel(16);
    Self {
      store,
      clock,
      settings,
      events,
    }
  }

  /// Build the shared cache and drop records that can no longer be served.
  pub fn init(store: Arc<dyn KeyValueStore>, settings: CacheSettings) -> Arc<Self> {
    let cache = Self::new(store, settings);
    let removed = cache.sweep();
    info!(
      removed,
      version = %cache.settings.schema_version,
      "dashboard cache initialized"
    );
    Arc::new(cache)
  }

  /// Current time according to the cache clock.
  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Receive [`CacheEvent`]s for removals and clears.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  /// Look up the entry for `key`, classifying its freshness.
  ///
  /// Expired, version-mismatched and undecodable records are deleted and
  /// reported as a miss.
  pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
    let storage_key = self.storage_key(key);

    let Some(record) = self.read_record(&storage_key) else {
      return CacheLookup::miss();
    };

    let Some(written_at) = self.validate(&storage_key, &record) else {
      return CacheLookup::miss();
    };

    let freshness = self.settings.windows.classify(self.clock.now() - written_at);
    if !freshness.is_servable() {
      debug!(%key, %written_at, "cache entry expired");
      self.discard(&storage_key);
      return CacheLookup::miss();
    }

    match serde_json::from_value::<T>(record.data) {
      Ok(payload) => {
        debug!(%key, freshness = freshness.label(), "cache hit");
        CacheLookup::hit(
          CacheEntry {
            payload,
            written_at,
            schema_version: record.version,
          },
          freshness,
        )
      }
      Err(e) => {
        debug!(%key, error = %e, "cached payload does not decode");
        self.discard(&storage_key);
        CacheLookup::miss()
      }
    }
  }

  /// Store `payload` under `key`, replacing any previous entry.
  pub fn set<P: Serialize + ?Sized>(&self, key: &CacheKey, payload: &P) {
    let data = match serde_json::to_value(payload) {
      Ok(data) => data,
      Err(e) => {
        warn!(%key, error = %e, "failed to serialize cache payload");
        return;
      }
    };

    let record = StoredRecord {
      data,
      timestamp: self.clock.now().timestamp_millis(),
      version: self.settings.schema_version.clone(),
    };

    let encoded = match serde_json::to_string(&record) {
      Ok(encoded) => encoded,
      Err(e) => {
        warn!(%key, error = %e, "failed to encode cache record");
        return;
      }
    };

    if let Err(e) = self.store.set(&self.storage_key(key), &encoded) {
      warn!(%key, error = %e, "failed to write cache entry");
    }
  }

  /// Remove the entry for `key` and notify subscribers.
  pub fn remove(&self, key: &CacheKey) {
    self.discard(&self.storage_key(key));
    let _ = self.events.send(CacheEvent::Removed(key.clone()));
  }

  /// Remove every entry in the cache namespace and notify subscribers.
  pub fn clear(&self) {
    let keys = self.namespaced_keys();
    for storage_key in &keys {
      self.discard(storage_key);
    }
    info!(removed = keys.len(), "dashboard cache cleared");
    let _ = self.events.send(CacheEvent::Cleared);
  }

  /// Summarize what the cache holds. Unreadable records count toward size only.
  pub fn stats(&self) -> CacheStats {
    let mut stats = CacheStats::default();

    for storage_key in self.namespaced_keys() {
      let raw = match self.store.get(&storage_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => continue,
        Err(e) => {
          warn!(key = %storage_key, error = %e, "failed to read cache entry for stats");
          continue;
        }
      };

      stats.count += 1;
      stats.total_bytes += raw.len();

      let written_at = serde_json::from_str::<StoredRecord>(&raw)
        .ok()
        .and_then(|record| DateTime::from_timestamp_millis(record.timestamp));

      if let Some(written_at) = written_at {
        stats.oldest_written_at = Some(match stats.oldest_written_at {
          Some(oldest) => oldest.min(written_at),
          None => written_at,
        });
        stats.newest_written_at = Some(match stats.newest_written_at {
          Some(newest) => newest.max(written_at),
          None => written_at,
        });
      }
    }

    stats
  }

  /// Delete every record that a read would reject. Returns how many were removed.
  pub fn sweep(&self) -> usize {
    let now = self.clock.now();
    let mut removed = 0;

    for storage_key in self.namespaced_keys() {
      let keep = self
        .read_record(&storage_key)
        .and_then(|record| self.validate(&storage_key, &record))
        .map(|written_at| self.settings.windows.classify(now - written_at).is_servable())
        .unwrap_or(false);

      if !keep {
        self.discard(&storage_key);
        removed += 1;
      }
    }

    removed
  }

  fn storage_key(&self, key: &CacheKey) -> String {
    format!("{}{}", self.settings.namespace, key)
  }

  fn namespaced_keys(&self) -> Vec<String> {
    match self.store.keys() {
      Ok(keys) => keys
        .into_iter()
        .filter(|k| k.starts_with(&self.settings.namespace))
        .collect(),
      Err(e) => {
        warn!(error = %e, "failed to list cache keys");
        Vec::new()
      }
    }
  }

  /// Read and parse a stored record. Unparseable records are deleted.
  fn read_record(&self, storage_key: &str) -> Option<StoredRecord> {
    let raw = match self.store.get(storage_key) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(key = %storage_key, error = %e, "failed to read cache entry");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(record) => Some(record),
      Err(e) => {
        debug!(key = %storage_key, error = %e, "discarding corrupt cache record");
        self.discard(storage_key);
        None
      }
    }
  }

  /// Check the version and timestamp of a record, deleting it when invalid.
  fn validate(&self, storage_key: &str, record: &StoredRecord) -> Option<DateTime<Utc>> {
    if record.version != self.settings.schema_version {
      debug!(
        key = %storage_key,
        found = %record.version,
        expected = %self.settings.schema_version,
        "discarding cache record from another schema version"
      );
      self.discard(storage_key);
      return None;
    }

    let written_at = DateTime::from_timestamp_millis(record.timestamp);
    if written_at.is_none() {
      self.discard(storage_key);
    }
    written_at
  }

  fn discard(&self, storage_key: &str) {
    if let Err(e) = self.store.remove(storage_key) {
      warn!(key = %storage_key, error = %e, "failed to remove cache entry");
    }
  }
}
