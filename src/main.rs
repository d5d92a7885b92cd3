mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod query;
mod ui;

use cache::{DashboardCache, KeyValueStore, MemoryStore, SqliteStore};
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shoplens")]
#[command(about = "A terminal dashboard for multi-tenant e-commerce analytics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shoplens/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Tenant id to show
  #[arg(short, long)]
  tenant: Option<String>,

  /// Number of days shown on startup
  #[arg(
    short,
    long,
    value_parser = clap::value_parser!(u32).range(1..=i64::from(api::MAX_RANGE_DAYS))
  )]
  days: Option<u32>,

  /// Keep cached data in memory only for this session
  #[arg(long)]
  no_cache: bool,

  /// Remove cached data, print cache statistics and exit
  #[arg(long)]
  clear_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(tenant) = args.tenant {
    config.api.tenant = Some(tenant);
  }
  if let Some(days) = args.days {
    config.default_range_days = days;
  }

  let _log_guard = logging::init_logging(&config.logging)?;

  let store: Arc<dyn KeyValueStore> = if args.no_cache || !config.cache.enabled {
    info!("using in-memory cache");
    Arc::new(MemoryStore::new())
  } else {
    Arc::new(SqliteStore::open(config.cache.path.as_deref())?)
  };
  let cache = DashboardCache::init(store, config.cache.settings());

  if args.clear_cache {
    cache.clear();
    let stats = cache.stats();
    println!("Cache cleared ({} entries, {} bytes remaining)", stats.count, stats.total_bytes);
    return Ok(());
  }

  // Initialize and run the app
  let mut app = app::App::new(config, cache)?;
  app.run().await?;

  Ok(())
}
