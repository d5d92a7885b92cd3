//! Core types for the dashboard cache.

use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time for cache timestamps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A decoded cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  /// The decoded response body
  pub payload: T,
  /// When the entry was stored
  pub written_at: DateTime<Utc>,
  /// Schema version the entry was written under
  pub schema_version: String,
}

/// Freshness tier of a cached entry, derived from its age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Younger than the fresh window
  Fresh,
  /// Old enough to refresh in the background, still safe to show
  UsableStale,
  /// Past the stale window but not yet expired
  Stale,
  /// Past the expiry window; never served
  Expired,
}

impl Freshness {
  pub fn is_fresh(self) -> bool {
    matches!(self, Freshness::Fresh)
  }

  pub fn is_servable(self) -> bool {
    !matches!(self, Freshness::Expired)
  }

  pub fn label(self) -> &'static str {
    match self {
      Freshness::Fresh => "fresh",
      Freshness::UsableStale => "stale",
      Freshness::Stale => "outdated",
      Freshness::Expired => "expired",
    }
  }
}

/// Age thresholds used to classify entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindows {
  pub fresh: Duration,
  pub stale: Duration,
  pub expired: Duration,
}

impl Default for FreshnessWindows {
  fn default() -> Self {
    Self {
      fresh: Duration::minutes(2),
      stale: Duration::minutes(10),
      expired: Duration::minutes(30),
    }
  }
}

impl FreshnessWindows {
  /// Classify an entry by its age. Negative ages (clock skew) count as fresh.
  pub fn classify(&self, age: Duration) -> Freshness {
    if age < self.fresh {
      Freshness::Fresh
    } else if age < self.stale {
      Freshness::UsableStale
    } else if age < self.expired {
      Freshness::Stale
    } else {
      Freshness::Expired
    }
  }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup<T> {
  pub entry: Option<CacheEntry<T>>,
  pub is_from_cache: bool,
  pub is_fresh: bool,
  pub freshness: Option<Freshness>,
}

impl<T> CacheLookup<T> {
  pub fn miss() -> Self {
    Self {
      entry: None,
      is_from_cache: false,
      is_fresh: false,
      freshness: None,
    }
  }

  pub fn hit(entry: CacheEntry<T>, freshness: Freshness) -> Self {
    Self {
      entry: Some(entry),
      is_from_cache: true,
      is_fresh: freshness.is_fresh(),
      freshness: Some(freshness),
    }
  }

  /// True when an entry was served but a background refresh is due.
  pub fn needs_refresh(&self) -> bool {
    self.entry.is_some() && !self.is_fresh
  }
}

/// Read-only snapshot of what the cache currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub count: usize,
  pub total_bytes: usize,
  pub oldest_written_at: Option<DateTime<Utc>>,
  pub newest_written_at: Option<DateTime<Utc>>,
}
