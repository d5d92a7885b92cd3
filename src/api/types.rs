//! JSON payloads returned by the analytics API.

use serde::Deserialize;

/// Aggregate metrics returned by `/api/dashboard`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
  pub revenue: f64,
  pub orders: u64,
  pub visitors: u64,
  #[serde(default)]
  pub conversion_rate: Option<f64>,
  #[serde(default)]
  pub average_order_value: Option<f64>,
  #[serde(default)]
  pub top_products: Vec<TopProduct>,
  #[serde(default)]
  pub sales_by_day: Vec<DailySales>,
}

impl DashboardMetrics {
  /// Conversion rate as reported, or derived from orders and visitors.
  pub fn conversion_rate(&self) -> f64 {
    self.conversion_rate.unwrap_or_else(|| {
      if self.visitors == 0 {
        0.0
      } else {
        self.orders as f64 / self.visitors as f64
      }
    })
  }

  /// Average order value as reported, or derived from revenue and orders.
  pub fn average_order_value(&self) -> f64 {
    self.average_order_value.unwrap_or_else(|| {
      if self.orders == 0 {
        0.0
      } else {
        self.revenue / self.orders as f64
      }
    })
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
  pub name: String,
  #[serde(default)]
  pub units_sold: u64,
  #[serde(default)]
  pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailySales {
  pub date: String,
  pub revenue: f64,
}
