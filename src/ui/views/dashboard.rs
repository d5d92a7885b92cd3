use crate::api::{DailySales, DashboardMetrics};
use crate::query::FetchState;
use crate::ui::renderfns::{format_count, format_money, format_percent, truncate};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Sparkline, Table, Wrap};

/// Draw the dashboard body: metric tiles, top products and daily revenue
pub fn draw_dashboard(frame: &mut Frame, area: Rect, state: &FetchState<DashboardMetrics>) {
  let Some(metrics) = state.data.as_ref() else {
    draw_placeholder(frame, area, state);
    return;
  };

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(4), // Metric tiles
      Constraint::Min(5),    // Products and sales
    ])
    .split(area);

  draw_tiles(frame, chunks[0], metrics);

  let body = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
    .split(chunks[1]);

  draw_top_products(frame, body[0], metrics);
  draw_sales(frame, body[1], &metrics.sales_by_day);
}

fn draw_placeholder(frame: &mut Frame, area: Rect, state: &FetchState<DashboardMetrics>) {
  let (content, color) = placeholder_text(state);
  let block = Block::default()
    .title(" Dashboard ")
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));
  let paragraph = Paragraph::new(content)
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
}

/// Message shown when there is no data to render
pub fn placeholder_text<T>(state: &FetchState<T>) -> (String, Color) {
  if state.is_loading || state.is_fetching {
    ("Loading dashboard...".to_string(), Color::DarkGray)
  } else if let Some(error) = &state.error {
    (
      format!("Failed to load dashboard: {}. Press 'r' to retry.", error),
      Color::Red,
    )
  } else if !state.is_online {
    (
      "Offline and nothing cached for this range.".to_string(),
      Color::Yellow,
    )
  } else {
    ("No data yet. Press 'r' to refresh.".to_string(), Color::DarkGray)
  }
}

fn draw_tiles(frame: &mut Frame, area: Rect, metrics: &DashboardMetrics) {
  let tiles = [
    ("Revenue", format_money(metrics.revenue)),
    ("Orders", format_count(metrics.orders)),
    ("Visitors", format_count(metrics.visitors)),
    ("Conversion", format_percent(metrics.conversion_rate())),
    ("Avg order", format_money(metrics.average_order_value())),
  ];

  let cells = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Ratio(1, tiles.len() as u32); 5])
    .split(area);

  for ((label, value), cell) in tiles.iter().zip(cells.iter()) {
    let block = Block::default()
      .title(format!(" {} ", label))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let paragraph = Paragraph::new(Line::from(Span::styled(
      value.as_str(),
      Style::default().fg(Color::White).bold(),
    )))
    .alignment(Alignment::Center)
    .block(block);
    frame.render_widget(paragraph, *cell);
  }
}

fn draw_top_products(frame: &mut Frame, area: Rect, metrics: &DashboardMetrics) {
  let block = Block::default()
    .title(format!(" Top products ({}) ", metrics.top_products.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if metrics.top_products.is_empty() {
    let paragraph = Paragraph::new("No sales in this range.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let name_width = area.width.saturating_sub(28).max(8) as usize;
  let rows: Vec<Row> = metrics
    .top_products
    .iter()
    .map(|product| {
      Row::new(vec![
        truncate(&product.name, name_width),
        format_count(product.units_sold),
        format_money(product.revenue),
      ])
    })
    .collect();

  let table = Table::new(
    rows,
    [
      Constraint::Min(8),
      Constraint::Length(8),
      Constraint::Length(14),
    ],
  )
  .header(
    Row::new(vec!["Product", "Units", "Revenue"]).style(Style::default().fg(Color::Cyan).bold()),
  )
  .block(block);

  frame.render_widget(table, area);
}

fn draw_sales(frame: &mut Frame, area: Rect, sales: &[DailySales]) {
  let total: f64 = sales.iter().map(|day| day.revenue).sum();
  let block = Block::default()
    .title(format!(" Daily revenue ({}) ", format_money(total)))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let values = sparkline_values(sales);
  let sparkline = Sparkline::default()
    .block(block)
    .data(&values)
    .style(Style::default().fg(Color::Green));

  frame.render_widget(sparkline, area);
}

/// Whole-currency revenue per day; negative values (refunds) clamp to zero
pub fn sparkline_values(sales: &[DailySales]) -> Vec<u64> {
  sales
    .iter()
    .map(|day| day.revenue.max(0.0).round() as u64)
    .collect()
}
