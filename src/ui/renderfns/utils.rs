use crate::cache::Freshness;
use crate::query::NoticeLevel;
use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format a currency amount with thousands separators
pub fn format_money(amount: f64) -> String {
  let cents = (amount.abs() * 100.0).round() as u64;
  let sign = if amount < 0.0 { "-" } else { "" };
  format!("{}${}.{:02}", sign, group_thousands(cents / 100), cents % 100)
}

/// Format an integer count with thousands separators
pub fn format_count(n: u64) -> String {
  group_thousands(n)
}

/// Format a 0..1 ratio as a percentage
pub fn format_percent(ratio: f64) -> String {
  format!("{:.2}%", ratio * 100.0)
}

fn group_thousands(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

/// Badge color for a freshness tier
pub fn freshness_color(freshness: Freshness) -> Color {
  match freshness {
    Freshness::Fresh => Color::Green,
    Freshness::UsableStale => Color::Yellow,
    Freshness::Stale | Freshness::Expired => Color::Red,
  }
}

/// Status bar color for a notice
pub fn notice_color(level: NoticeLevel) -> Color {
  match level {
    NoticeLevel::Info => Color::Green,
    NoticeLevel::Warning => Color::Yellow,
    NoticeLevel::Error => Color::Red,
  }
}
