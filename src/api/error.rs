//! Classified live-fetch failures.

use thiserror::Error;

/// Why a live fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The request never completed (DNS, connect, reset)
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  /// No connectivity; the request was not attempted
  #[error("offline")]
  Offline,
  #[error("server error ({status})")]
  Server { status: u16 },
  /// 401/403: the session must be re-established
  #[error("not authorized ({status})")]
  Auth { status: u16 },
  /// Any other non-success status
  #[error("request rejected ({status})")]
  Client { status: u16 },
  /// The response arrived but is not the expected shape
  #[error("malformed response: {0}")]
  Malformed(String),
}

impl FetchError {
  /// Map a non-success HTTP status to its error class.
  pub fn from_status(status: u16) -> Self {
    match status {
      401 | 403 => FetchError::Auth { status },
      500..=599 => FetchError::Server { status },
      _ => FetchError::Client { status },
    }
  }

  /// Transient failures that a later attempt may fix.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      FetchError::Network(_) | FetchError::Timeout | FetchError::Offline | FetchError::Server { .. }
    )
  }

  /// Failures caused by connectivity rather than by the server's answer.
  pub fn is_network(&self) -> bool {
    matches!(
      self,
      FetchError::Network(_) | FetchError::Timeout | FetchError::Offline
    )
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, FetchError::Auth { .. })
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Server { status } | FetchError::Auth { status } | FetchError::Client { status } => {
        Some(*status)
      }
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status() {
    assert_eq!(FetchError::from_status(401), FetchError::Auth { status: 401 });
    assert_eq!(FetchError::from_status(403), FetchError::Auth { status: 403 });
    assert_eq!(FetchError::from_status(502), FetchError::Server { status: 502 });
    assert_eq!(FetchError::from_status(404), FetchError::Client { status: 404 });
  }

  #[test]
  fn test_classification() {
    assert!(FetchError::Network("reset".into()).is_retryable());
    assert!(FetchError::Timeout.is_retryable());
    assert!(FetchError::Server { status: 503 }.is_retryable());
    assert!(!FetchError::Auth { status: 401 }.is_retryable());
    assert!(!FetchError::Client { status: 422 }.is_retryable());
    assert!(!FetchError::Malformed("x".into()).is_retryable());

    assert!(FetchError::Offline.is_network());
    assert!(!FetchError::Server { status: 500 }.is_network());
    assert_eq!(FetchError::Server { status: 500 }.status(), Some(500));
    assert_eq!(FetchError::Timeout.status(), None);
  }
}
