use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::MAX_RANGE_DAYS;
use crate::cache::{CacheSettings, FreshnessWindows};
use crate::query::{RefreshSettings, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  /// Number of days shown when the dashboard opens
  #[serde(default = "default_range_days")]
  pub default_range_days: u32,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub refresh: RefreshConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

fn default_range_days() -> u32 {
  7
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  /// Tenant id sent as `X-Tenant-Id`
  pub tenant: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_probe_interval_secs() -> u64 {
  15
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist payloads to disk; when false the cache only lives in memory
  pub enabled: bool,
  /// Database path (default: $XDG_DATA_HOME/shoplens/cache.db)
  pub path: Option<PathBuf>,
  pub namespace: String,
  /// Bump to invalidate every stored entry after a payload shape change
  pub schema_version: String,
  pub fresh_secs: i64,
  pub stale_secs: i64,
  pub expired_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      namespace: "shoplens-cache:".to_string(),
      schema_version: "v1".to_string(),
      fresh_secs: 120,
      stale_secs: 600,
      expired_secs: 1800,
    }
  }
}

impl CacheConfig {
  pub fn settings(&self) -> CacheSettings {
    CacheSettings {
      namespace: self.namespace.clone(),
      schema_version: self.schema_version.clone(),
      windows: FreshnessWindows {
        fresh: chrono::Duration::seconds(self.fresh_secs),
        stale: chrono::Duration::seconds(self.stale_secs),
        expired: chrono::Duration::seconds(self.expired_secs),
      },
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  pub auto_refresh: bool,
  pub interval_secs: u64,
  pub idle_timeout_secs: u64,
  pub idle_check_secs: u64,
  pub toast_cooldown_secs: u64,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      auto_refresh: true,
      interval_secs: 300,
      idle_timeout_secs: 600,
      idle_check_secs: 60,
      toast_cooldown_secs: 60,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
  /// Upper bound of the random extra delay, as a fraction of the base delay
  pub jitter_ratio: f64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay_ms: 1_000,
      max_delay_ms: 30_000,
      jitter_ratio: 0.1,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when SHOPLENS_LOG is not set
  pub level: String,
  /// Log directory (default: $XDG_DATA_HOME/shoplens/logs)
  pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shoplens.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shoplens/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shoplens/config.yaml\n\
                 with at least `api: {{ url: https://your-shop.example.com }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shoplens.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shoplens").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    let c = &self.cache;
    if !(0 < c.fresh_secs && c.fresh_secs <= c.stale_secs && c.stale_secs <= c.expired_secs) {
      return Err(eyre!(
        "cache windows must satisfy 0 < fresh_secs <= stale_secs <= expired_secs"
      ));
    }
    if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
      return Err(eyre!("retry.jitter_ratio must be between 0 and 1"));
    }
    if !(1..=MAX_RANGE_DAYS).contains(&self.default_range_days) {
      return Err(eyre!(
        "default_range_days must be between 1 and {}",
        MAX_RANGE_DAYS
      ));
    }
    if self.refresh.interval_secs == 0 {
      return Err(eyre!("refresh.interval_secs must be positive"));
    }
    Ok(())
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Checks SHOPLENS_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SHOPLENS_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry.max_attempts,
      base_delay: Duration::from_millis(self.retry.base_delay_ms),
      max_delay: Duration::from_millis(self.retry.max_delay_ms),
      jitter_ratio: self.retry.jitter_ratio,
    }
  }

  pub fn refresh_settings(&self) -> RefreshSettings {
    RefreshSettings {
      auto_refresh: self.refresh.auto_refresh,
      interval: Duration::from_secs(self.refresh.interval_secs),
      idle_timeout: Duration::from_secs(self.refresh.idle_timeout_secs),
      idle_check_interval: Duration::from_secs(self.refresh.idle_check_secs),
      toast_cooldown: Duration::from_secs(self.refresh.toast_cooldown_secs),
      request_timeout: Duration::from_secs(self.api.timeout_secs),
    }
  }
}
