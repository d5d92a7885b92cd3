//! Freshness-tiered local cache for dashboard payloads.
//!
//! This module keeps the last known-good payload per request key so views can
//! render immediately while a live fetch runs:
//! - Entries carry a write timestamp and a schema version
//! - Reads classify entries as fresh, usable-stale, stale or expired
//! - Expired, corrupt and version-mismatched entries are purged on read
//! - Storage is injected, so the same logic runs over SQLite or memory

mod key;
mod layer;
mod storage;
mod traits;

pub use key::CacheKey;
pub use layer::{CacheEvent, CacheSettings, DashboardCache};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use traits::{Freshness, FreshnessWindows};

#[cfg(test)]
pub(crate) use traits::test_clock::ManualClock;
