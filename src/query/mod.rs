//! Cache-first dashboard query with retry, idle pausing and auto-refresh.
//!
//! `DashboardQuery<T, F>` follows the same shape as a TanStack-style query:
//! network calls run on spawned tasks and report back over a channel, and the
//! owner calls `poll()` from its event loop so every state change happens on
//! that loop.
//!
//! # Example
//!
//! ```ignore
//! let mut query: DashboardQuery<DashboardMetrics, ApiClient> =
//!   DashboardQuery::new(cache, Arc::new(client), policy, settings);
//!
//! // Shows cached data right away if any, then fetches live data
//! query.mount(ResourceRequest::dashboard(range));
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // On any key or mouse event
//! query.record_activity();
//! ```

mod idle;
mod notice;
mod retry;
mod state;

pub use idle::IdleTracker;
pub use notice::{Notice, NoticeLevel, ToastLimiter};
pub use retry::RetryPolicy;
pub use state::{FetchState, Phase};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{FetchError, ResourceFetcher, ResourceRequest};
use crate::cache::{CacheEvent, CacheKey, DashboardCache, Freshness};

/// Scheduling settings for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSettings {
  pub auto_refresh: bool,
  pub interval: Duration,
  pub idle_timeout: Duration,
  pub idle_check_interval: Duration,
  pub toast_cooldown: Duration,
  pub request_timeout: Duration,
}

impl Default for RefreshSettings {
  fn default() -> Self {
    Self {
      auto_refresh: true,
      interval: Duration::from_secs(5 * 60),
      idle_timeout: Duration::from_secs(10 * 60),
      idle_check_interval: Duration::from_secs(60),
      toast_cooldown: Duration::from_secs(60),
      request_timeout: Duration::from_secs(30),
    }
  }
}

/// What started a live fetch.
#[derive(Debug, Clone, Copy)]
enum Trigger {
  Mount,
  Manual,
  Retry,
  AutoRefresh,
  Reconnect,
  Invalidated,
}

impl Trigger {
  fn as_str(self) -> &'static str {
    match self {
      Trigger::Mount => "mount",
      Trigger::Manual => "manual",
      Trigger::Retry => "retry",
      Trigger::AutoRefresh => "auto_refresh",
      Trigger::Reconnect => "reconnect",
      Trigger::Invalidated => "invalidated",
    }
  }
}

/// A finished live fetch, tagged with the generation it was issued under.
struct Completion {
  generation: u64,
  result: Result<Value, FetchError>,
}

/// Cache-first query for one dashboard resource at a time.
pub struct DashboardQuery<T, F> {
  cache: Arc<DashboardCache>,
  fetcher: Arc<F>,
  policy: RetryPolicy,
  settings: RefreshSettings,

  request: Option<ResourceRequest>,
  key: Option<CacheKey>,
  state: FetchState<T>,
  phase: Phase,

  /// Bumped on every mount and invalidation; older completions are dropped
  generation: u64,
  in_flight: usize,
  tx: mpsc::UnboundedSender<Completion>,
  rx: mpsc::UnboundedReceiver<Completion>,
  invalidations: broadcast::Receiver<CacheEvent>,

  retry_at: Option<Instant>,
  next_refresh_at: Option<Instant>,
  idle: IdleTracker,
  toasts: ToastLimiter,
  notices: VecDeque<Notice>,
}

impl<T, F> DashboardQuery<T, F>
where
  T: DeserializeOwned,
  F: ResourceFetcher,
{
  pub fn new(
    cache: Arc<DashboardCache>,
    fetcher: Arc<F>,
    policy: RetryPolicy,
    settings: RefreshSettings,
  ) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let invalidations = cache.subscribe();
    let now = Instant::now();

    Self {
      cache,
      fetcher,
      policy,
      state: FetchState::new(settings.auto_refresh),
      idle: IdleTracker::new(settings.idle_timeout, settings.idle_check_interval, now),
      toasts: ToastLimiter::new(settings.toast_cooldown),
      settings,
      request: None,
      key: None,
      phase: Phase::Idle,
      generation: 0,
      in_flight: 0,
      tx,
      rx,
      invalidations,
      retry_at: None,
      next_refresh_at: None,
      notices: VecDeque::new(),
    }
  }

  pub fn state(&self) -> &FetchState<T> {
    &self.state
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn request(&self) -> Option<&ResourceRequest> {
    self.request.as_ref()
  }

  /// Next user-facing notice, oldest first.
  pub fn take_notice(&mut self) -> Option<Notice> {
    self.notices.pop_front()
  }

  /// Point the query at `request`: surface any usable cached entry now and
  /// start a live fetch regardless of its freshness.
  pub fn mount(&mut self, request: ResourceRequest) {
    let key = request.cache_key();
    self.generation += 1;
    self.in_flight = 0;
    self.retry_at = None;
    self.next_refresh_at = None;
    self.state.retry_count = 0;
    self.state.is_retrying = false;
    self.state.error = None;
    self.transition(Phase::CacheLoading);

    let lookup = self.cache.get::<T>(&key);
    match lookup.entry {
      Some(entry) => {
        self.state.data = Some(entry.payload);
        self.state.is_from_cache = true;
        self.state.is_fresh = lookup.is_fresh;
        self.state.freshness = lookup.freshness;
        self.state.last_updated = Some(entry.written_at);
        self.transition(Phase::CacheHit);
      }
      None => {
        self.state.clear_data();
        self.transition(Phase::CacheMiss);
      }
    }

    self.key = Some(key);
    self.request = Some(request);
    self.start_fetch(Trigger::Mount);
    self.refresh_flags();
  }

  /// Fetch now, even while idle. Cancels any pending retry.
  ///
  /// Fails with [`FetchError::Offline`] when no fetch can be issued; the
  /// current data stays in place.
  pub fn refetch(&mut self) -> Result<(), FetchError> {
    if !self.state.is_online {
      debug!("manual refresh skipped while offline");
      return Err(FetchError::Offline);
    }
    self.retry_at = None;
    self.state.is_retrying = false;
    self.start_fetch(Trigger::Manual);
    self.refresh_flags();
    Ok(())
  }

  /// Apply finished fetches, invalidations and due timers.
  ///
  /// Returns `true` if the state changed. Call this on every event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.drain_invalidations();

    while let Ok(completion) = self.rx.try_recv() {
      changed |= self.apply(completion);
    }

    let now = Instant::now();
    changed |= self.check_idle(now);
    changed |= self.run_timers(now);
    changed |= self.update_countdown(now);
    changed
  }

  /// Record user input. Returns `true` if this ended an idle period.
  pub fn record_activity(&mut self) -> bool {
    let now = Instant::now();
    if !self.idle.record_activity(now) {
      return false;
    }
    self.state.is_user_idle = false;
    info!("activity detected, auto-refresh resumed");
    self.update_countdown(now);
    true
  }

  /// Going offline halts scheduled fetches; coming back resets the retry
  /// budget and refreshes immediately when auto-refresh is active.
  pub fn set_online(&mut self, online: bool) -> bool {
    if self.state.is_online == online {
      return false;
    }
    self.state.is_online = online;

    if online {
      info!("connection restored");
      self.state.retry_count = 0;
      self.notices.push_back(Notice::recovered());
      if self.state.is_auto_refresh_enabled && !self.state.is_user_idle {
        self.start_fetch(Trigger::Reconnect);
      }
    } else {
      warn!("connection lost, scheduled fetches halted");
      self.retry_at = None;
      self.state.is_retrying = false;
    }

    self.refresh_flags();
    self.update_countdown(Instant::now());
    true
  }

  pub fn set_auto_refresh(&mut self, enabled: bool) {
    self.state.is_auto_refresh_enabled = enabled;
    if enabled && self.next_refresh_at.is_none() && self.in_flight == 0 && self.request.is_some() {
      self.next_refresh_at = Some(Instant::now() + self.settings.interval);
    }
    info!(enabled, "auto-refresh toggled");
    self.update_countdown(Instant::now());
  }

  pub fn toggle_auto_refresh(&mut self) -> bool {
    let enabled = !self.state.is_auto_refresh_enabled;
    self.set_auto_refresh(enabled);
    enabled
  }

  fn auto_refresh_active(&self) -> bool {
    self.state.is_auto_refresh_enabled
      && !self.state.is_user_idle
      && self.state.is_online
      && !self.state.is_retrying
  }

  fn start_fetch(&mut self, trigger: Trigger) -> bool {
    let Some(request) = &self.request else {
      return false;
    };

    if !self.state.is_online {
      debug!(trigger = trigger.as_str(), "offline, live fetch skipped");
      self.transition(Phase::Waiting);
      return false;
    }

    let generation = self.generation;
    let future = self.fetcher.fetch_json(&request.path(), &request.params);
    let timeout = self.settings.request_timeout;
    let tx = self.tx.clone();

    tokio::spawn(async move {
      let result = match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
      };
      // Ignore send errors - the query may have been dropped
      let _ = tx.send(Completion { generation, result });
    });

    self.in_flight += 1;
    debug!(
      key = ?self.key.as_ref().map(CacheKey::as_str),
      generation,
      trigger = trigger.as_str(),
      "live fetch started"
    );
    self.transition(Phase::LiveFetching);
    true
  }

  fn apply(&mut self, completion: Completion) -> bool {
    if completion.generation != self.generation {
      debug!(
        generation = completion.generation,
        current = self.generation,
        "discarding response for superseded request"
      );
      return false;
    }
    self.in_flight = self.in_flight.saturating_sub(1);

    let decoded = completion.result.and_then(|value| {
      T::deserialize(&value)
        .map(|data| (value, data))
        .map_err(|e| FetchError::Malformed(e.to_string()))
    });

    match decoded {
      Ok((value, data)) => self.on_success(value, data),
      Err(error) => self.on_failure(error),
    }
    self.refresh_flags();
    true
  }

  fn on_success(&mut self, value: Value, data: T) {
    if let Some(key) = &self.key {
      self.cache.set(key, &value);
      info!(%key, "live data loaded");
    }

    self.state.data = Some(data);
    self.state.is_from_cache = false;
    self.state.is_fresh = true;
    self.state.freshness = Some(Freshness::Fresh);
    self.state.error = None;
    self.state.last_updated = Some(self.cache.now());
    self.state.retry_count = 0;
    self.state.is_retrying = false;
    self.retry_at = None;
    self.next_refresh_at = Some(Instant::now() + self.settings.interval);

    self.transition(Phase::Success);
    self.transition(Phase::Waiting);
  }

  fn on_failure(&mut self, error: FetchError) {
    let now = Instant::now();
    self.state.error = Some(error.clone());
    self.state.last_error_time = Some(self.cache.now());
    self.transition(Phase::Failure);

    if error.is_network() && !self.state.is_online {
      debug!(%error, "fetch failed while offline, waiting for connectivity");
      self.state.is_retrying = false;
      self.retry_at = None;
      self.transition(Phase::Waiting);
      return;
    }

    self.state.retry_count += 1;
    let retry_count = self.state.retry_count;

    if self.policy.should_retry(&error, retry_count) {
      let delay = self.policy.delay(retry_count - 1);
      warn!(
        %error,
        retry_count,
        delay_ms = delay.as_millis() as u64,
        "live fetch failed, retry scheduled"
      );
      self.retry_at = Some(now + delay);
      self.state.is_retrying = true;
      self.notify(
        Notice::retrying(&error, delay, retry_count, self.policy.max_attempts),
        now,
      );
      self.transition(Phase::RetryScheduled);
    } else {
      warn!(%error, retry_count, "live fetch failed, not retrying");
      self.retry_at = None;
      self.state.is_retrying = false;
      self.next_refresh_at = Some(now + self.settings.interval);
      self.notify(Notice::failed(&error), now);
      self.transition(Phase::Waiting);
    }
  }

  fn run_timers(&mut self, now: Instant) -> bool {
    if let Some(at) = self.retry_at {
      if now >= at && self.state.is_online {
        self.retry_at = None;
        let started = self.start_fetch(Trigger::Retry);
        self.refresh_flags();
        return started;
      }
      return false;
    }

    if !self.auto_refresh_active() || self.in_flight > 0 {
      return false;
    }

    match self.next_refresh_at {
      Some(at) if now >= at => {
        self.next_refresh_at = None;
        let started = self.start_fetch(Trigger::AutoRefresh);
        self.refresh_flags();
        started
      }
      _ => false,
    }
  }

  fn check_idle(&mut self, now: Instant) -> bool {
    if !self.idle.check(now) {
      return false;
    }
    self.state.is_user_idle = true;
    info!("session idle, auto-refresh paused");
    true
  }

  fn update_countdown(&mut self, now: Instant) -> bool {
    let seconds = match self.next_refresh_at {
      Some(at) if self.auto_refresh_active() => {
        let remaining = at.saturating_duration_since(now);
        (remaining.as_millis() as u64).div_ceil(1000)
      }
      _ => 0,
    };

    if seconds == self.state.next_refresh_in_seconds {
      return false;
    }
    self.state.next_refresh_in_seconds = seconds;
    true
  }

  fn drain_invalidations(&mut self) -> bool {
    let mut changed = false;
    loop {
      match self.invalidations.try_recv() {
        Ok(CacheEvent::Cleared) | Err(TryRecvError::Lagged(_)) => changed |= self.invalidate(),
        Ok(CacheEvent::Removed(key)) => {
          if self.key.as_ref() == Some(&key) {
            changed |= self.invalidate();
          }
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
    changed
  }

  /// Drop in-memory data for the current request and fetch it again.
  fn invalidate(&mut self) -> bool {
    if self.request.is_none() {
      return false;
    }
    debug!("cache invalidated, dropping in-memory data");
    self.generation += 1;
    self.in_flight = 0;
    self.retry_at = None;
    self.state.retry_count = 0;
    self.state.is_retrying = false;
    self.state.clear_data();
    self.start_fetch(Trigger::Invalidated);
    self.refresh_flags();
    true
  }

  fn refresh_flags(&mut self) {
    self.state.is_fetching = self.in_flight > 0;
    self.state.is_loading = self.state.is_fetching && self.state.data.is_none();
  }

  fn notify(&mut self, notice: Notice, now: Instant) {
    if self.toasts.allow(now) {
      self.notices.push_back(notice);
    } else {
      debug!(message = %notice.message, "notice suppressed by cooldown");
    }
  }

  fn transition(&mut self, phase: Phase) {
    if self.phase != phase {
      debug!(from = ?self.phase, to = ?phase, "query phase");
      self.phase = phase;
    }
  }
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for DashboardQuery<T, F> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DashboardQuery")
      .field("request", &self.request)
      .field("phase", &self.phase)
      .field("generation", &self.generation)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{DashboardMetrics, DateRange};
  use crate::cache::{CacheSettings, ManualClock, MemoryStore};
  use chrono::NaiveDate;
  use futures::future::BoxFuture;
  use futures::FutureExt;
  use serde_json::json;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use tokio::sync::oneshot;

  enum Scripted {
    Ready(Result<Value, FetchError>),
    Gated(oneshot::Receiver<Result<Value, FetchError>>),
  }

  /// Fetcher that replays scripted responses, then a fallback.
  struct ScriptedFetcher {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Result<Value, FetchError>,
    calls: AtomicUsize,
  }

  impl ScriptedFetcher {
    fn new(fallback: Result<Value, FetchError>) -> Self {
      Self {
        script: Mutex::new(VecDeque::new()),
        fallback,
        calls: AtomicUsize::new(0),
      }
    }

    fn then(self, result: Result<Value, FetchError>) -> Self {
      self.script.lock().unwrap().push_back(Scripted::Ready(result));
      self
    }

    fn gate(&self) -> oneshot::Sender<Result<Value, FetchError>> {
      let (tx, rx) = oneshot::channel();
      self.script.lock().unwrap().push_back(Scripted::Gated(rx));
      tx
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl ResourceFetcher for ScriptedFetcher {
    fn fetch_json(
      &self,
      _path: &str,
      _params: &BTreeMap<String, String>,
    ) -> BoxFuture<'static, Result<Value, FetchError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let next = self.script.lock().unwrap().pop_front();
      match next {
        Some(Scripted::Ready(result)) => futures::future::ready(result).boxed(),
        Some(Scripted::Gated(rx)) => async move {
          rx.await
            .unwrap_or_else(|_| Err(FetchError::Network("gate dropped".into())))
        }
        .boxed(),
        None => futures::future::ready(self.fallback.clone()).boxed(),
      }
    }
  }

  type TestQuery = DashboardQuery<DashboardMetrics, ScriptedFetcher>;

  fn metrics(revenue: f64) -> Value {
    json!({"revenue": revenue, "orders": 3, "visitors": 100})
  }

  fn week(start: &str) -> ResourceRequest {
    let to = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap() + chrono::Duration::days(6);
    ResourceRequest::dashboard(DateRange::last_days(7, to))
  }

  fn cache() -> (Arc<DashboardCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = DashboardCache::with_clock(
      Arc::new(MemoryStore::new()),
      clock.clone(),
      CacheSettings::default(),
    );
    (Arc::new(cache), clock)
  }

  fn query(cache: &Arc<DashboardCache>, fetcher: &Arc<ScriptedFetcher>) -> TestQuery {
    let policy = RetryPolicy {
      jitter_ratio: 0.0,
      ..RetryPolicy::default()
    };
    DashboardQuery::new(
      Arc::clone(cache),
      Arc::clone(fetcher),
      policy,
      RefreshSettings::default(),
    )
  }

  /// Let spawned fetch tasks run to completion.
  async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
  }

  fn revenue(query: &TestQuery) -> Option<f64> {
    query.state().data.as_ref().map(|m| m.revenue)
  }

  #[tokio::test(start_paused = true)]
  async fn test_empty_cache_then_cache_hit_on_second_mount() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(42.0))));

    let mut first = query(&cache, &fetcher);
    first.mount(week("2024-01-01"));
    assert!(first.state().is_loading);
    assert!(!first.state().is_from_cache);
    assert_eq!(first.phase(), Phase::LiveFetching);

    settle().await;
    assert!(first.poll());
    assert!(!first.state().is_loading);
    assert!(first.state().is_fresh);
    assert_eq!(revenue(&first), Some(42.0));
    assert_eq!(first.phase(), Phase::Waiting);

    let mut second = query(&cache, &fetcher);
    second.mount(week("2024-01-01"));
    assert!(second.state().is_from_cache);
    assert!(second.state().is_fresh);
    assert!(!second.state().is_loading);
    assert!(second.state().is_fetching);
    assert_eq!(revenue(&second), Some(42.0));
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_entry_served_then_upgraded() {
    let (cache, clock) = cache();
    let request = week("2024-01-01");
    cache.set(&request.cache_key(), &metrics(1.0));
    clock.advance(chrono::Duration::minutes(5));

    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(2.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(request.clone());

    assert!(query.state().is_from_cache);
    assert!(!query.state().is_fresh);
    assert_eq!(query.state().freshness, Some(Freshness::UsableStale));
    assert_eq!(revenue(&query), Some(1.0));
    assert!(!query.state().is_loading);

    settle().await;
    query.poll();
    assert!(query.state().is_fresh);
    assert!(!query.state().is_from_cache);
    assert_eq!(revenue(&query), Some(2.0));

    let lookup = cache.get::<DashboardMetrics>(&request.cache_key());
    assert!(lookup.is_fresh);
    assert_eq!(lookup.entry.unwrap().payload.revenue, 2.0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_then_success() {
    let (cache, _) = cache();
    let fetcher = Arc::new(
      ScriptedFetcher::new(Ok(metrics(5.0)))
        .then(Err(FetchError::Server { status: 503 }))
        .then(Err(FetchError::Network("reset".into()))),
    );
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));

    settle().await;
    query.poll();
    assert!(query.state().is_retrying);
    assert_eq!(query.state().retry_count, 1);
    assert_eq!(query.phase(), Phase::RetryScheduled);
    assert!(query.state().error.is_some());
    assert!(query.state().last_error_time.is_some());

    tokio::time::advance(Duration::from_millis(999)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 2);

    settle().await;
    query.poll();
    assert_eq!(query.state().retry_count, 2);

    tokio::time::advance(Duration::from_millis(2_000)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 3);

    settle().await;
    query.poll();
    assert_eq!(query.state().retry_count, 0);
    assert!(!query.state().is_retrying);
    assert!(query.state().error.is_none());
    assert_eq!(revenue(&query), Some(5.0));
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_exhaustion_keeps_cached_data() {
    let (cache, _) = cache();
    let request = week("2024-01-01");
    cache.set(&request.cache_key(), &metrics(9.0));

    let fetcher = Arc::new(ScriptedFetcher::new(Err(FetchError::Server { status: 500 })));
    let mut query = query(&cache, &fetcher);
    query.mount(request);

    for _ in 0..5 {
      settle().await;
      query.poll();
      tokio::time::advance(Duration::from_secs(31)).await;
      query.poll();
    }
    settle().await;
    query.poll();

    assert_eq!(fetcher.calls(), 5);
    assert_eq!(query.state().retry_count, 5);
    assert!(!query.state().is_retrying);
    assert_eq!(
      query.state().error,
      Some(FetchError::Server { status: 500 })
    );
    assert_eq!(revenue(&query), Some(9.0));
    assert!(query.state().is_from_cache);

    tokio::time::advance(Duration::from_secs(60)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_auth_error_not_retried() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Err(FetchError::Auth { status: 401 })));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));

    settle().await;
    query.poll();
    assert!(!query.state().is_retrying);
    assert!(query.state().error.as_ref().unwrap().is_auth());

    let notice = query.take_notice().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.message.contains("sign in"));

    tokio::time::advance(Duration::from_secs(60)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_malformed_payload_not_retried() {
    let (cache, _) = cache();
    let request = week("2024-01-01");
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(json!({"unexpected": true}))));
    let mut query = query(&cache, &fetcher);
    query.mount(request.clone());

    settle().await;
    query.poll();
    assert!(matches!(query.state().error, Some(FetchError::Malformed(_))));
    assert!(!query.state().is_retrying);
    assert!(query.state().data.is_none());
    assert!(cache.get::<Value>(&request.cache_key()).entry.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_auto_refresh_countdown() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(1.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));

    settle().await;
    query.poll();
    assert_eq!(query.state().next_refresh_in_seconds, 300);

    tokio::time::advance(Duration::from_secs(100)).await;
    query.poll();
    assert_eq!(query.state().next_refresh_in_seconds, 200);

    tokio::time::advance(Duration::from_secs(200)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(query.state().next_refresh_in_seconds, 0);

    settle().await;
    query.poll();
    assert_eq!(query.state().next_refresh_in_seconds, 300);
  }

  #[tokio::test(start_paused = true)]
  async fn test_auto_refresh_disabled() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(1.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();

    assert!(!query.toggle_auto_refresh());
    assert_eq!(query.state().next_refresh_in_seconds, 0);
    tokio::time::advance(Duration::from_secs(301)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 1);

    query.set_auto_refresh(true);
    query.poll();
    assert_eq!(fetcher.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_idle_suspends_auto_refresh() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(1.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    query.poll();
    assert!(query.state().is_user_idle);
    assert_eq!(query.state().next_refresh_in_seconds, 0);
    assert_eq!(fetcher.calls(), 1);

    assert!(query.record_activity());
    assert!(!query.state().is_user_idle);
    query.poll();
    assert_eq!(fetcher.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_manual_refetch_while_idle() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(1.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    query.poll();
    assert!(query.state().is_user_idle);

    assert!(query.refetch().is_ok());
    assert_eq!(fetcher.calls(), 2);
    assert!(query.state().is_fetching);
  }

  #[tokio::test(start_paused = true)]
  async fn test_offline_halts_and_online_refetches() {
    let (cache, _) = cache();
    let fetcher = Arc::new(
      ScriptedFetcher::new(Ok(metrics(3.0))).then(Err(FetchError::Server { status: 502 })),
    );
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();
    assert_eq!(query.state().retry_count, 1);
    assert!(query.state().is_retrying);

    assert!(query.set_online(false));
    assert!(!query.state().is_retrying);
    assert_eq!(query.state().next_refresh_in_seconds, 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 1);

    assert!(query.set_online(true));
    assert_eq!(query.state().retry_count, 0);
    assert_eq!(fetcher.calls(), 2);

    let mut notices = Vec::new();
    while let Some(notice) = query.take_notice() {
      notices.push(notice);
    }
    assert!(notices.contains(&Notice::recovered()));

    settle().await;
    query.poll();
    assert_eq!(revenue(&query), Some(3.0));
  }

  #[tokio::test(start_paused = true)]
  async fn test_countdown_halts_when_offline() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(3.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();
    assert_eq!(query.state().next_refresh_in_seconds, 300);

    query.set_online(false);
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    query.poll();
    assert_eq!(query.state().next_refresh_in_seconds, 0);
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_failure_while_offline_not_counted() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(1.0))));
    let gate = fetcher.gate();
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));

    query.set_online(false);
    gate.send(Err(FetchError::Network("unreachable".into()))).unwrap();
    settle().await;
    query.poll();

    assert_eq!(query.state().retry_count, 0);
    assert!(!query.state().is_retrying);
    assert!(query.state().error.as_ref().unwrap().is_network());
  }

  #[tokio::test(start_paused = true)]
  async fn test_offline_mount_serves_cache_without_fetching() {
    let (cache, _) = cache();
    let request = week("2024-01-01");
    cache.set(&request.cache_key(), &metrics(7.0));

    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(8.0))));
    let mut query = query(&cache, &fetcher);
    query.set_online(false);
    query.mount(request);

    assert_eq!(revenue(&query), Some(7.0));
    assert!(!query.state().is_fetching);
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_response_for_previous_key_is_discarded() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(2.0))));
    let slow = fetcher.gate();
    let mut query = query(&cache, &fetcher);

    let old = week("2024-01-01");
    query.mount(old.clone());
    query.mount(week("2024-01-08"));

    settle().await;
    query.poll();
    assert_eq!(revenue(&query), Some(2.0));

    slow.send(Ok(metrics(1.0))).unwrap();
    settle().await;
    assert!(!query.poll());
    assert_eq!(revenue(&query), Some(2.0));
    assert!(cache.get::<Value>(&old.cache_key()).entry.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_cache_clear_drops_in_memory_data() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(4.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();
    assert!(query.state().data.is_some());

    let gate = fetcher.gate();
    cache.clear();
    assert!(query.poll());
    assert!(query.state().data.is_none());
    assert!(query.state().is_loading);
    assert_eq!(fetcher.calls(), 2);

    gate.send(Ok(metrics(6.0))).unwrap();
    settle().await;
    query.poll();
    assert_eq!(revenue(&query), Some(6.0));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cache_clear_cancels_pending_retry() {
    let (cache, _) = cache();
    let fetcher = Arc::new(
      ScriptedFetcher::new(Ok(metrics(4.0))).then(Err(FetchError::Server { status: 503 })),
    );
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();
    assert!(query.state().is_retrying);
    assert_eq!(query.state().retry_count, 1);

    let gate = fetcher.gate();
    cache.clear();
    query.poll();
    assert!(!query.state().is_retrying);
    assert_eq!(query.state().retry_count, 0);
    assert_eq!(fetcher.calls(), 2);

    // The old retry delay passes while the refetch is still in flight
    tokio::time::advance(Duration::from_secs(2)).await;
    query.poll();
    assert_eq!(fetcher.calls(), 2);

    gate.send(Ok(metrics(6.0))).unwrap();
    settle().await;
    query.poll();
    assert_eq!(revenue(&query), Some(6.0));
    assert_eq!(query.state().next_refresh_in_seconds, 300);
  }

  #[tokio::test(start_paused = true)]
  async fn test_manual_refetch_offline_keeps_data() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(4.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();

    query.set_online(false);
    assert_eq!(query.refetch(), Err(FetchError::Offline));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(revenue(&query), Some(4.0));
  }

  #[tokio::test(start_paused = true)]
  async fn test_remove_of_other_key_is_ignored() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(metrics(4.0))));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));
    settle().await;
    query.poll();

    cache.remove(&week("2024-02-01").cache_key());
    query.poll();
    assert!(query.state().data.is_some());
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_notices_are_rate_limited() {
    let (cache, _) = cache();
    let fetcher = Arc::new(ScriptedFetcher::new(Err(FetchError::Timeout)));
    let mut query = query(&cache, &fetcher);
    query.mount(week("2024-01-01"));

    settle().await;
    query.poll();
    tokio::time::advance(Duration::from_secs(1)).await;
    query.poll();
    settle().await;
    query.poll();
    assert_eq!(query.state().retry_count, 2);

    let first = query.take_notice().unwrap();
    assert_eq!(first.level, NoticeLevel::Warning);
    assert!(first.message.starts_with("Connection problem"));
    assert!(query.take_notice().is_none());
  }
}
