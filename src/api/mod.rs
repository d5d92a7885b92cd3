//! Analytics backend access: requests, payload types and the HTTP fetcher.

mod client;
mod connectivity;
mod error;
mod request;
mod types;

pub use client::{ApiClient, ResourceFetcher};
pub use connectivity::spawn_connectivity_probe;
pub use error::FetchError;
pub use request::{DateRange, ResourceRequest, MAX_RANGE_DAYS};
pub use types::{DailySales, DashboardMetrics};
