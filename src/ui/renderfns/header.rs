use super::utils::freshness_color;
use crate::api::DateRange;
use crate::query::FetchState;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with title, tenant, range and data status
pub fn draw_header<T>(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  tenant: Option<&str>,
  range: DateRange,
  state: &FetchState<T>,
) {
  let separator = || Span::styled("│", Style::default().fg(Color::DarkGray));

  let mut spans = vec![
    Span::styled(" shoplens ", Style::default().fg(Color::Cyan).bold()),
    separator(),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
  ];
  if let Some(tenant) = tenant {
    spans.push(separator());
    spans.push(Span::styled(
      format!(" {} ", tenant),
      Style::default().fg(Color::Yellow).bold(),
    ));
  }
  spans.push(separator());
  spans.push(Span::styled(
    format!(" {} ", range),
    Style::default().fg(Color::White),
  ));
  spans.push(Span::raw(" "));

  for (label, color) in status_badges(state) {
    spans.push(Span::styled(
      format!("[{}]", label),
      Style::default().fg(color),
    ));
    spans.push(Span::raw(" "));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Short status labels describing where the data came from and what happens next
pub fn status_badges<T>(state: &FetchState<T>) -> Vec<(String, Color)> {
  let mut badges = Vec::new();

  if state.data.is_some() {
    match state.freshness {
      Some(freshness) if state.is_from_cache => {
        badges.push((format!("cached: {}", freshness.label()), freshness_color(freshness)));
      }
      _ => badges.push(("live".to_string(), Color::Green)),
    }
  }

  if state.is_fetching {
    badges.push(("syncing".to_string(), Color::Cyan));
  } else if state.is_retrying {
    badges.push((format!("retry {}", state.retry_count), Color::Yellow));
  }

  if state.is_online {
    badges.push(("online".to_string(), Color::Green));
  } else {
    badges.push(("offline".to_string(), Color::Red));
  }

  if state.is_user_idle {
    badges.push(("idle".to_string(), Color::DarkGray));
  }

  if !state.is_auto_refresh_enabled {
    badges.push(("auto off".to_string(), Color::DarkGray));
  } else if state.next_refresh_in_seconds > 0 {
    badges.push((
      format!("refresh in {}s", state.next_refresh_in_seconds),
      Color::DarkGray,
    ));
  }

  badges
}
