mod components;
mod renderfns;
mod views;

use crate::app::{App, Mode};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use renderfns::notice_color;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    app.tenant(),
    app.range(),
    app.state(),
  );

  views::draw_dashboard(frame, chunks[1], app.state());

  if *app.mode() == Mode::Command {
    components::draw_command_overlay(
      frame,
      chunks[1],
      app.command_input(),
      &app.autocomplete_suggestions(),
      app.selected_suggestion(),
    );
  }

  draw_status_bar(frame, chunks[2], app);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match (app.mode(), app.notice()) {
    (Mode::Command, _) => {
      let cmd = format!(":{}", app.command_input());
      (cmd, Style::default().fg(Color::Yellow))
    }
    (Mode::Normal, Some(notice)) => (
      format!(" {}", notice.message),
      Style::default().fg(notice_color(notice.level)),
    ),
    (Mode::Normal, None) => {
      let hint = " :command  r:refresh  a:auto-refresh  [/]:range  q:quit";
      (hint.to_string(), Style::default().fg(Color::DarkGray))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
