//! HTTP fetcher for the analytics API.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::FetchError;
use crate::config::Config;

/// Fetches JSON resources from the analytics backend.
///
/// Implementations attach credentials themselves and report 401/403 as
/// [`FetchError::Auth`] so callers can tell them apart from transient failures.
pub trait ResourceFetcher: Send + Sync + 'static {
  fn fetch_json(
    &self,
    path: &str,
    params: &BTreeMap<String, String>,
  ) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// Analytics API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = Config::get_api_token() {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      headers.insert(AUTHORIZATION, value);
    }

    if let Some(tenant) = &config.api.tenant {
      let value =
        HeaderValue::from_str(tenant).map_err(|e| eyre!("Invalid tenant id {}: {}", tenant, e))?;
      headers.insert("X-Tenant-Id", value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .gzip(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn resource_url(&self, path: &str, params: &BTreeMap<String, String>) -> Result<Url, FetchError> {
    let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
    let mut url = Url::parse(&joined).map_err(|e| FetchError::Network(e.to_string()))?;
    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(params.iter());
    }
    Ok(url)
  }
}

impl ResourceFetcher for ApiClient {
  fn fetch_json(
    &self,
    path: &str,
    params: &BTreeMap<String, String>,
  ) -> BoxFuture<'static, Result<Value, FetchError>> {
    let http = self.http.clone();
    let url = self.resource_url(path, params);

    async move {
      let url = url?;
      debug!(%url, "fetching resource");

      let response = http.get(url).send().await.map_err(map_transport_error)?;

      let status = response.status();
      if !status.is_success() {
        return Err(FetchError::from_status(status.as_u16()));
      }

      let body = response.bytes().await.map_err(map_transport_error)?;
      serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
    .boxed()
  }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout
  } else {
    FetchError::Network(e.to_string())
  }
}
