//! User-facing status notices and their cooldown.

use std::time::Duration;
use tokio::time::Instant;

use crate::api::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Warning,
  Error,
}

/// A user-facing status message produced by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  /// A transient failure with another attempt scheduled.
  pub fn retrying(error: &FetchError, delay: Duration, attempt: u32, max_attempts: u32) -> Self {
    let cause = if error.is_network() {
      "Connection problem"
    } else {
      "Server error"
    };
    Self {
      level: NoticeLevel::Warning,
      message: format!(
        "{}, retrying in {}s ({}/{})",
        cause,
        delay.as_secs_f64().ceil() as u64,
        attempt,
        max_attempts
      ),
    }
  }

  /// A failure that will not be retried automatically.
  pub fn failed(error: &FetchError) -> Self {
    let message = match error {
      FetchError::Auth { status } => {
        format!("Not authorized ({}). Please sign in again.", status)
      }
      e if e.is_network() => {
        "Unable to reach the server. Showing last known data.".to_string()
      }
      e => format!("Failed to load dashboard data: {}", e),
    };
    Self {
      level: NoticeLevel::Error,
      message,
    }
  }

  pub fn recovered() -> Self {
    Self {
      level: NoticeLevel::Info,
      message: "Back online, refreshing data".to_string(),
    }
  }

  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Info,
      message: message.into(),
    }
  }
}

/// Lets at most one error notice through per cooldown window.
#[derive(Debug)]
pub struct ToastLimiter {
  cooldown: Duration,
  last_shown: Option<Instant>,
}

impl ToastLimiter {
  pub fn new(cooldown: Duration) -> Self {
    Self {
      cooldown,
      last_shown: None,
    }
  }

  pub fn allow(&mut self, now: Instant) -> bool {
    match self.last_shown {
      Some(at) if now.saturating_duration_since(at) < self.cooldown => false,
      _ => {
        self.last_shown = Some(now);
        true
      }
    }
  }
}
