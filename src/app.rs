use crate::api::{self, ApiClient, DashboardMetrics, DateRange, ResourceRequest};
use crate::cache::DashboardCache;
use crate::commands::{self, Action, Command};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::query::{DashboardQuery, FetchState, Notice, NoticeLevel};
use crate::ui;
use color_eyre::Result;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long a notice stays in the status bar
const NOTICE_TTL: Duration = Duration::from_secs(6);

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
}

/// Main application state
pub struct App {
  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  /// Application configuration
  config: Config,

  cache: Arc<DashboardCache>,
  client: ApiClient,
  query: DashboardQuery<DashboardMetrics, ApiClient>,

  /// Date range currently shown
  range: DateRange,

  /// Notice shown in the status bar, with the time it appeared
  notice: Option<(Notice, Instant)>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, cache: Arc<DashboardCache>) -> Result<Self> {
    let client = ApiClient::new(&config)?;
    let query = DashboardQuery::new(
      Arc::clone(&cache),
      Arc::new(client.clone()),
      config.retry_policy(),
      config.refresh_settings(),
    );
    let today = chrono::Local::now().date_naive();
    let range = DateRange::last_days(config.default_range_days, today);

    Ok(Self {
      mode: Mode::Normal,
      command_input: String::new(),
      selected_suggestion: 0,
      config,
      cache,
      client,
      query,
      range,
      notice: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Cleanup terminal
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
  ) -> Result<()> {
    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    api::spawn_connectivity_probe(
      self.client.base_url(),
      Duration::from_secs(self.config.api.probe_interval_secs),
      events.sender(),
    );

    // Initial data load
    self.query.mount(ResourceRequest::dashboard(self.range));
    info!(range = %self.range, "dashboard mounted");

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => {
        self.query.record_activity();
        self.handle_key(key);
      }
      Event::Activity => {
        self.query.record_activity();
      }
      Event::Tick => {}
      Event::Connectivity(online) => {
        self.query.set_online(online);
      }
    }

    if self.query.poll() {
      debug!(phase = ?self.query.phase(), "query state changed");
    }
    self.pump_notices();
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      KeyCode::Char('r') => self.apply_action(Action::Refresh),
      KeyCode::Char('a') => self.apply_action(Action::ToggleAuto),

      // Move the window by its own length
      KeyCode::Char('[') | KeyCode::Left => self.shift_range(-1),
      KeyCode::Char(']') | KeyCode::Right => self.shift_range(1),

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        // Navigate autocomplete suggestions
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = (self.selected_suggestion + 1) % suggestions.len();
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        // Navigate autocomplete suggestions backwards
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = if self.selected_suggestion == 0 {
            suggestions.len() - 1
          } else {
            self.selected_suggestion - 1
          };
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0; // Reset selection on input change
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0; // Reset selection on input change
      }
      _ => {}
    }
  }

  fn execute_command(&mut self) {
    // A lone word picks the highlighted suggestion; arguments are kept as typed
    let input = self.command_input.trim().to_string();
    let suggestions = commands::get_suggestions(&input);
    let line = match (input.split_once(' '), suggestions.get(self.selected_suggestion)) {
      (None, Some(cmd)) => cmd.name.to_string(),
      (Some((_, args)), Some(cmd)) => format!("{} {}", cmd.name, args),
      _ => input,
    };

    match commands::parse(&line) {
      Ok(action) => self.apply_action(action),
      Err(message) => self.show(Notice {
        level: NoticeLevel::Warning,
        message,
      }),
    }
    self.command_input.clear();
  }

  fn apply_action(&mut self, action: Action) {
    match action {
      Action::Refresh => {
        let path = self.query.request().map(|r| r.path()).unwrap_or_default();
        info!(%path, "manual refresh");
        if let Err(error) = self.query.refetch() {
          self.show(Notice {
            level: NoticeLevel::Warning,
            message: format!("Refresh skipped ({}), showing cached data", error),
          });
        }
      }
      Action::ToggleAuto => {
        let enabled = self.query.toggle_auto_refresh();
        self.show(Notice::info(if enabled {
          "Auto-refresh on"
        } else {
          "Auto-refresh off"
        }));
      }
      Action::Range(days) => {
        let today = chrono::Local::now().date_naive();
        self.set_range(DateRange::last_days(days, today));
      }
      Action::ClearCache => {
        self.cache.clear();
        self.show(Notice::info("Cache cleared"));
      }
      Action::Stats => {
        let stats = self.cache.stats();
        let oldest = stats
          .oldest_written_at
          .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
          .unwrap_or_else(|| "-".to_string());
        self.show(Notice::info(format!(
          "Cache: {} entries, {} bytes, oldest {}",
          stats.count, stats.total_bytes, oldest
        )));
      }
      Action::Quit => self.should_quit = true,
    }
  }

  fn shift_range(&mut self, direction: i64) {
    match self.range.shift_days(direction * self.range.len_days()) {
      Some(range) => self.set_range(range),
      None => self.show(Notice {
        level: NoticeLevel::Warning,
        message: "Date range cannot move any further".to_string(),
      }),
    }
  }

  fn set_range(&mut self, range: DateRange) {
    self.range = range;
    info!(range = %range, "date range changed");
    self.query.mount(ResourceRequest::dashboard(range));
  }

  fn show(&mut self, notice: Notice) {
    self.notice = Some((notice, Instant::now()));
  }

  fn pump_notices(&mut self) {
    while let Some(notice) = self.query.take_notice() {
      self.show(notice);
    }
    if matches!(&self.notice, Some((_, at)) if at.elapsed() > NOTICE_TTL) {
      self.notice = None;
    }
  }

  // Accessors for UI rendering
  pub fn state(&self) -> &FetchState<DashboardMetrics> {
    self.query.state()
  }

  pub fn range(&self) -> DateRange {
    self.range
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn notice(&self) -> Option<&Notice> {
    self.notice.as_ref().map(|(notice, _)| notice)
  }

  pub fn title(&self) -> &str {
    self
      .config
      .title
      .as_deref()
      .or_else(|| self.client.base_url().host_str())
      .unwrap_or("shoplens")
  }

  pub fn tenant(&self) -> Option<&str> {
    self.config.api.tenant.as_deref()
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.command_input)
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}
