//! User idle detection for pausing auto-refresh.

use std::time::Duration;
use tokio::time::Instant;

/// Tracks user activity and flags the session idle on periodic checks.
#[derive(Debug)]
pub struct IdleTracker {
  timeout: Duration,
  check_interval: Duration,
  last_activity: Instant,
  last_check: Instant,
  idle: bool,
}

impl IdleTracker {
  pub fn new(timeout: Duration, check_interval: Duration, now: Instant) -> Self {
    Self {
      timeout,
      check_interval,
      last_activity: now,
      last_check: now,
      idle: false,
    }
  }

  pub fn is_idle(&self) -> bool {
    self.idle
  }

  /// Record user input. Returns true if this ended an idle period.
  pub fn record_activity(&mut self, now: Instant) -> bool {
    self.last_activity = now;
    std::mem::replace(&mut self.idle, false)
  }

  /// Run the periodic idle check if it is due. Returns true if the session
  /// just became idle.
  pub fn check(&mut self, now: Instant) -> bool {
    if now.saturating_duration_since(self.last_check) < self.check_interval {
      return false;
    }
    self.last_check = now;

    if !self.idle && now.saturating_duration_since(self.last_activity) >= self.timeout {
      self.idle = true;
      return true;
    }
    false
  }
}
