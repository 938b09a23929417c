//! HTTP client for the upstream time-series provider.
//!
//! This client is only used for fetching missing windows; all responses are
//! cached by the caller before being returned. It performs no retries: a
//! failed fetch is retried by the next request or the next refresher tick.

use crate::domain::{format_timestamp, Record, SeriesWindow, UpstreamProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Upstream provider reached over HTTP.
///
/// Issues `GET {base_url}?symbol=..&period=..&start=..&end=..` and expects a
/// JSON array of records.
#[derive(Clone)]
pub struct HttpUpstreamProvider {
    client: Client,
    base_url: String,
}

impl HttpUpstreamProvider {
    /// Create a client whose transport timeout matches the per-fetch timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("timeseries-cache-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query parameters for one window, in the provider's wire format.
    fn query_params(window: &SeriesWindow) -> [(&'static str, String); 4] {
        [
            ("symbol", window.symbol.clone()),
            ("period", window.period.as_str().to_string()),
            ("start", format_timestamp(&window.start)),
            ("end", format_timestamp(&window.end)),
        ]
    }

    /// Accept only a JSON array body.
    fn into_records(body: Value) -> Result<Vec<Record>> {
        match body {
            Value::Array(records) => Ok(records),
            other => anyhow::bail!("Expected a JSON array of records, got {}", json_kind(&other)),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl UpstreamProvider for HttpUpstreamProvider {
    async fn fetch(&self, window: &SeriesWindow) -> Result<Vec<Record>> {
        debug!("Fetching from upstream provider: {}", window);

        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&Self::query_params(window))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} from {}", window, self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Upstream request failed with status {}: {}",
                status,
                error_body
            );
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON for {}", window))?;

        Self::into_records(body)
    }
}
