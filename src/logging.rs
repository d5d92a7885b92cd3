//! File logging with tracing.
//!
//! The terminal belongs to the dashboard, so events go to a daily rolling
//! file instead of stderr. `SHOPLENS_LOG` overrides the configured filter.

use crate::config::LoggingConfig;
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const LOG_ENV: &str = "SHOPLENS_LOG";
const LOG_FILE_PREFIX: &str = "shoplens.log";

/// Initialize logging. Keep the returned guard alive until exit so buffered
/// lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter '{}': {}", config.level, e))?;

  let dir = log_dir(config)?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file = fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true);

  Registry::default()
    .with(filter)
    .with(file)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  info!(dir = %dir.display(), "logging initialized");
  Ok(guard)
}

/// Configured log directory, or `$XDG_DATA_HOME/shoplens/logs`
pub fn log_dir(config: &LoggingConfig) -> Result<PathBuf> {
  match &config.dir {
    Some(dir) => Ok(dir.clone()),
    None => dirs::data_dir()
      .map(|d| d.join("shoplens").join("logs"))
      .ok_or_else(|| eyre!("Could not determine data directory")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_explicit_log_dir() {
    let config = LoggingConfig {
      level: "debug".to_string(),
      dir: Some(PathBuf::from("/tmp/shoplens-logs")),
    };
    assert_eq!(log_dir(&config).unwrap(), PathBuf::from("/tmp/shoplens-logs"));
  }

  #[test]
  fn test_default_log_dir_under_data_dir() {
    if let Ok(dir) = log_dir(&LoggingConfig::default()) {
      assert!(dir.ends_with("shoplens/logs"));
    }
  }
}
