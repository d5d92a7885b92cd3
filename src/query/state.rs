//! Observable query state.

use chrono::{DateTime, Utc};

use crate::api::FetchError;
use crate::cache::Freshness;

/// Where a query is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Not mounted yet
  Idle,
  CacheLoading,
  CacheHit,
  CacheMiss,
  LiveFetching,
  Success,
  Failure,
  RetryScheduled,
  /// Waiting for the next scheduled refresh, reconnect or user action
  Waiting,
}

/// Everything a view needs to render a query.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
  pub data: Option<T>,
  /// A live fetch is in flight and there is nothing to show yet
  pub is_loading: bool,
  /// A live fetch for the current request is in flight
  pub is_fetching: bool,
  pub is_from_cache: bool,
  pub is_fresh: bool,
  pub freshness: Option<Freshness>,
  pub error: Option<FetchError>,
  pub last_updated: Option<DateTime<Utc>>,

  pub retry_count: u32,
  pub is_retrying: bool,
  pub last_error_time: Option<DateTime<Utc>>,

  pub is_online: bool,
  pub is_user_idle: bool,
  pub is_auto_refresh_enabled: bool,
  pub next_refresh_in_seconds: u64,
}

impl<T> FetchState<T> {
  pub fn new(auto_refresh: bool) -> Self {
    Self {
      data: None,
      is_loading: false,
      is_fetching: false,
      is_from_cache: false,
      is_fresh: false,
      freshness: None,
      error: None,
      last_updated: None,
      retry_count: 0,
      is_retrying: false,
      last_error_time: None,
      is_online: true,
      is_user_idle: false,
      is_auto_refresh_enabled: auto_refresh,
      next_refresh_in_seconds: 0,
    }
  }

  pub(super) fn clear_data(&mut self) {
    self.data = None;
    self.is_from_cache = false;
    self.is_fresh = false;
    self.freshness = None;
    self.last_updated = None;
  }
}
