//! Deterministic cache keys.

use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded::byte_serialize;

/// Cache key derived from a resource name and its effective query parameters.
///
/// Rendered as `resource|name=value|...` with parameters in name order. Every
/// component is form-encoded, so `|` and `=` inside a name or value cannot
/// shift the boundaries. Names and values are kept exactly as they are sent to
/// the backend: two requests share a key only if they send the same query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(resource: &str, params: &BTreeMap<String, String>) -> Self {
    let mut key = encode(resource);
    for (name, value) in params {
      key.push('|');
      key.push_str(&encode(name));
      key.push('=');
      key.push_str(&encode(value));
    }
    Self(key)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn encode(component: &str) -> String {
  byte_serialize(component.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn test_key_format() {
    let key = CacheKey::new(
      "dashboard",
      &params(&[("to", "2024-01-07"), ("from", "2024-01-01")]),
    );
    assert_eq!(key.as_str(), "dashboard|from=2024-01-01|to=2024-01-07");
  }

  #[test]
  fn test_identical_requests_share_key() {
    let a = CacheKey::new("dashboard", &params(&[("from", "2024-01-01"), ("to", "2024-01-07")]));
    let b = CacheKey::new("dashboard", &params(&[("to", "2024-01-07"), ("from", "2024-01-01")]));
    assert_eq!(a, b);
  }

  #[test]
  fn test_separators_in_values_do_not_collide() {
    let packed = CacheKey::new("orders", &params(&[("x", "1|y=2")]));
    let split = CacheKey::new("orders", &params(&[("x", "1"), ("y", "2")]));
    assert_ne!(packed, split);
    assert_eq!(packed.as_str(), "orders|x=1%7Cy%3D2");
  }

  #[test]
  fn test_case_and_whitespace_are_significant() {
    let upper = CacheKey::new("orders", &params(&[("Sku", "1")]));
    let lower = CacheKey::new("orders", &params(&[("sku", "1")]));
    let padded = CacheKey::new("orders", &params(&[("sku", " 1")]));
    assert_ne!(upper, lower);
    assert_ne!(lower, padded);
  }

  #[test]
  fn test_different_filters_do_not_collide() {
    let a = CacheKey::new("dashboard", &params(&[("from", "2024-01-01")]));
    let b = CacheKey::new("dashboard", &params(&[("from", "2024-01-02")]));
    let c = CacheKey::new("orders", &params(&[("from", "2024-01-01")]));
    assert_ne!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn test_no_params() {
    assert_eq!(CacheKey::new("products", &BTreeMap::new()).as_str(), "products");
  }
}
