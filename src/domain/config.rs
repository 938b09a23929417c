//! Application configuration loaded from `config.yaml`.
//!
//! Every value has a default so an empty (or partial) file is valid.

use crate::domain::Period;
use anyhow::Context;
use chrono::TimeDelta;
use serde::Deserialize;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub refresher: RefresherConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {} - ensure file exists in working directory", path))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse {} - check YAML syntax and structure", path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Server configuration settings.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated list of allowed CORS origins (default: "*")
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
    /// Per-request timeout applied by the HTTP middleware
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_allowed_origins() -> String {
    "*".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// Cache store settings.
#[derive(Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Standard TTL for every entry (default: 600s)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How often expired entries are actively evicted (default: 60s)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound on buckets per request
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_buckets: default_max_buckets(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    600
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_max_buckets() -> usize {
    10_000
}

/// Upstream provider settings.
#[derive(Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bound on each provider call; a timeout is an upstream failure
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Missing buckets fetched in parallel per request
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

fn default_base_url() -> String {
    "https://externalAPI.com/".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_fetches() -> usize {
    4
}

/// Background refresher settings.
#[derive(Deserialize, Debug, Clone)]
pub struct RefresherConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_period")]
    pub period: Period,
    /// Tick cadence (default: 60s)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Length of the "most recent" window fetched each tick (default: 60s)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RefresherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Look-back of each tick, at least one second.
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(self.window_secs.max(1) as i64)
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            symbol: default_symbol(),
            period: default_period(),
            interval_secs: default_interval_secs(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_symbol() -> String {
    "AAPL".to_string()
}
fn default_period() -> Period {
    Period::OneMinute
}
fn default_interval_secs() -> u64 {
    60
}
fn default_window_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cache.ttl_secs, 600);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.refresher.symbol, "AAPL");
        assert_eq!(config.refresher.period, Period::OneMinute);
        assert_eq!(config.refresher.interval(), Duration::from_secs(60));
        assert_eq!(config.refresher.window(), TimeDelta::seconds(60));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let yaml = r#"
cache:
  ttl_secs: 120
refresher:
  symbol: MSFT
  period: 5min
upstream:
  base_url: http://localhost:9000/bars
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache.ttl(), Duration::from_secs(120));
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.refresher.symbol, "MSFT");
        assert_eq!(config.refresher.period, Period::FiveMinutes);
        assert_eq!(config.upstream.base_url, "http://localhost:9000/bars");
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(AppConfig::from_yaml("cache: [unclosed").is_err());
    }

    #[test]
    fn test_zero_refresher_window_is_clamped() {
        let config = AppConfig::from_yaml("refresher:\n  window_secs: 0\n").unwrap();
        assert_eq!(config.refresher.window(), TimeDelta::seconds(1));
    }
}
