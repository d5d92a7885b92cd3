//! Resource requests and the date ranges that filter them.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;

use crate::cache::CacheKey;

/// Inclusive range of calendar days used to filter dashboard resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  pub from: NaiveDate,
  pub to: NaiveDate,
}

/// Longest range the dashboard will request, roughly ten years.
pub const MAX_RANGE_DAYS: u32 = 3660;

impl DateRange {
  /// The `days` days ending on `today`, inclusive. `days` is clamped to
  /// `1..=MAX_RANGE_DAYS`.
  pub fn last_days(days: u32, today: NaiveDate) -> Self {
    let days = days.clamp(1, MAX_RANGE_DAYS);
    Self {
      from: today
        .checked_sub_signed(Duration::days(i64::from(days) - 1))
        .unwrap_or(NaiveDate::MIN),
      to: today,
    }
  }

  pub fn len_days(&self) -> i64 {
    (self.to - self.from).num_days() + 1
  }

  /// Move both ends by `days`, or `None` past the supported calendar.
  pub fn shift_days(&self, days: i64) -> Option<Self> {
    let by = Duration::try_days(days)?;
    Some(Self {
      from: self.from.checked_add_signed(by)?,
      to: self.to.checked_add_signed(by)?,
    })
  }

  fn insert_params(&self, params: &mut BTreeMap<String, String>) {
    params.insert("from".to_string(), self.from.format("%Y-%m-%d").to_string());
    params.insert("to".to_string(), self.to.format("%Y-%m-%d").to_string());
  }
}

impl fmt::Display for DateRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} → {}", self.from, self.to)
  }
}

/// A JSON resource plus the query parameters it is fetched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
  pub resource: String,
  pub params: BTreeMap<String, String>,
}

impl ResourceRequest {
  pub fn new(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      params: BTreeMap::new(),
    }
  }

  pub fn dashboard(range: DateRange) -> Self {
    Self::ranged("dashboard", range)
  }

  fn ranged(resource: &str, range: DateRange) -> Self {
    let mut request = Self::new(resource);
    range.insert_params(&mut request.params);
    request
  }

  pub fn path(&self) -> String {
    format!("/api/{}", self.resource)
  }

  pub fn cache_key(&self) -> CacheKey {
    CacheKey::new(&self.resource, &self.params)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  #[test]
  fn test_last_days() {
    let range = DateRange::last_days(7, date("2024-01-07"));
    assert_eq!(range.from, date("2024-01-01"));
    assert_eq!(range.to, date("2024-01-07"));
    assert_eq!(range.len_days(), 7);

    let single = DateRange::last_days(0, date("2024-01-07"));
    assert_eq!(single.from, single.to);
  }

  #[test]
  fn test_shift_days() {
    let range = DateRange::last_days(7, date("2024-01-07"))
      .shift_days(-7)
      .unwrap();
    assert_eq!(range.from, date("2023-12-25"));
    assert_eq!(range.to, date("2023-12-31"));
  }

  #[test]
  fn test_last_days_clamps_huge_ranges() {
    let range = DateRange::last_days(100_000_000, date("2024-01-07"));
    assert_eq!(range.len_days(), i64::from(MAX_RANGE_DAYS));
    assert_eq!(range.to, date("2024-01-07"));
  }

  #[test]
  fn test_shift_past_calendar_end() {
    let range = DateRange {
      from: NaiveDate::MAX,
      to: NaiveDate::MAX,
    };
    assert_eq!(range.shift_days(1), None);
    assert_eq!(range.shift_days(i64::MAX), None);
    assert!(range.shift_days(-1).is_some());
  }

  #[test]
  fn test_dashboard_request() {
    let request = ResourceRequest::dashboard(DateRange::last_days(7, date("2024-01-07")));
    assert_eq!(request.path(), "/api/dashboard");
    assert_eq!(
      request.cache_key().as_str(),
      "dashboard|from=2024-01-01|to=2024-01-07"
    );
  }

  #[test]
  fn test_products_request() {
    let mut request = ResourceRequest::new("products");
    request.params.insert("limit".to_string(), "10".to_string());
    assert_eq!(request.path(), "/api/products");
    assert_eq!(request.cache_key().as_str(), "products|limit=10");
  }
}
