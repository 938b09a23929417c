//! Integration tests for the REST API.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`, backed by
//! the in-memory cache store and a scripted upstream provider.
//! Run with: `cargo test --test http_api_test`

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use timeseries_cache_gateway::api::routes::create_router;
use timeseries_cache_gateway::api::state::AppState;
use timeseries_cache_gateway::application::{RangeResolver, ResolverSettings};
use timeseries_cache_gateway::domain::{CacheKey, CacheStore, Record, SeriesWindow, UpstreamProvider};
use timeseries_cache_gateway::infrastructure::MemoryCacheStore;
use tower::ServiceExt;

/// Upstream provider returning one record per 30s of the requested window.
#[derive(Default)]
struct ScriptedProvider {
    calls: Mutex<Vec<SeriesWindow>>,
    failing: bool,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl UpstreamProvider for ScriptedProvider {
    async fn fetch(&self, window: &SeriesWindow) -> anyhow::Result<Vec<Record>> {
        self.calls.lock().unwrap().push(window.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing {
            anyhow::bail!("upstream returned 502 Bad Gateway");
        }
        let mut records = Vec::new();
        let mut t = window.start;
        while t < window.end {
            records.push(json!({ "symbol": window.symbol, "t": t.to_rfc3339() }));
            t += chrono::TimeDelta::seconds(30);
        }
        Ok(records)
    }
}

struct TestApp {
    router: Router,
    provider: Arc<ScriptedProvider>,
    store: Arc<MemoryCacheStore>,
}

fn test_app(provider: ScriptedProvider) -> TestApp {
    let settings = ResolverSettings {
        ttl: Duration::from_secs(600),
        fetch_timeout: Duration::from_secs(5),
        max_concurrent_fetches: 4,
        max_buckets: 1_000,
    };
    test_app_with(provider, settings, Duration::from_secs(30))
}

fn test_app_with(provider: ScriptedProvider, settings: ResolverSettings, request_timeout: Duration) -> TestApp {
    let provider = Arc::new(provider);
    let store = Arc::new(MemoryCacheStore::new());
    let resolver = Arc::new(RangeResolver::new(provider.clone(), store.clone(), settings));
    let state = AppState {
        resolver,
        store: store.clone(),
        metrics: None,
    };
    TestApp {
        router: create_router(state, "*", request_timeout),
        provider,
        store,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let cache = response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cache, body)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
}

const RANGE_URI: &str =
    "/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T09:32:30Z";

#[tokio::test]
async fn test_missing_parameters_return_400() {
    let app = test_app(ScriptedProvider::default());
    let (status, _, body) = get(&app.router, "/v1/timeseries?symbol=AAPL&period=1min").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Symbol, period, start time, and end time are required");
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn test_inverted_range_returns_400_without_touching_cache() {
    let app = test_app(ScriptedProvider::default());
    let (status, _, _) = get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T10:00:00Z&end=2024-01-02T09:00:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.call_count(), 0);
    assert_eq!(app.store.stats().await.misses, 0);
}

#[tokio::test]
async fn test_range_is_merged_in_order_and_cached() {
    let app = test_app(ScriptedProvider::default());

    let (status, cache, body) = get(&app.router, RANGE_URI).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    let times: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["t"].as_str().unwrap())
        .collect();
    assert_eq!(
        times,
        vec![
            "2024-01-02T09:30:00+00:00",
            "2024-01-02T09:30:30+00:00",
            "2024-01-02T09:31:00+00:00",
            "2024-01-02T09:31:30+00:00",
            "2024-01-02T09:32:00+00:00",
        ]
    );
    // three buckets: two full minutes and a clamped 30s tail
    assert_eq!(app.provider.call_count(), 3);

    let (status, cache, again) = get(&app.router, RANGE_URI).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(again, body);
    assert_eq!(app.provider.call_count(), 3);
}

#[tokio::test]
async fn test_overlapping_query_reuses_buckets() {
    let app = test_app(ScriptedProvider::default());
    get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T09:32:00Z",
    )
    .await;
    assert_eq!(app.provider.call_count(), 2);

    let (status, cache, body) = get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T09:33:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("PARTIAL"));
    assert_eq!(body.as_array().unwrap().len(), 6);
    assert_eq!(app.provider.call_count(), 3);
}

#[tokio::test]
async fn test_upstream_failure_returns_500() {
    let app = test_app(ScriptedProvider {
        failing: true,
        ..Default::default()
    });
    let (status, _, body) = get(&app.router, RANGE_URI).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch data from external API");
    assert!(body["details"].as_str().unwrap().contains("502 Bad Gateway"));
}

#[tokio::test]
async fn test_unknown_period_is_fetched_as_one_window() {
    let app = test_app(ScriptedProvider::default());
    let (status, _, body) = get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=bogus&start=2024-01-02T09:30:00Z&end=2024-01-02T09:35:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 10);
    assert_eq!(app.provider.call_count(), 1);
}

#[tokio::test]
async fn test_current_snapshot_endpoint() {
    let app = test_app(ScriptedProvider::default());
    let (status, _, _) = get(&app.router, "/v1/timeseries/current").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.store
        .set(
            CacheKey::CurrentSnapshot,
            Arc::new(vec![json!({ "t": t0().to_rfc3339(), "close": 187.2 })]),
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    let (status, _, body) = get(&app.router, "/v1/timeseries/current").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["close"], 187.2);
}

#[tokio::test]
async fn test_health_and_cache_stats() {
    let app = test_app(ScriptedProvider::default());
    get(&app.router, RANGE_URI).await;

    let (status, _, health) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert!(health.get("version").is_some());
    assert_eq!(health["backend"], "memory-cache");

    let (status, _, stats) = get(&app.router, "/v1/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    // three buckets plus the whole-range entry
    assert_eq!(stats["entries"], 4);
    assert_eq!(stats["misses"], 4);
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let app = test_app(ScriptedProvider::default());
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app(ScriptedProvider::default());
    let (status, _, _) = get(&app.router, "/v1/nonexistent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_long_unknown_period_is_resolved_as_one_window() {
    let app = test_app(ScriptedProvider::default());
    let (status, cache, body) = get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=1minute_adjusted_x&start=2024-01-02T09:30:00Z&end=2024-01-02T09:35:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(body.as_array().unwrap().len(), 10);
    assert_eq!(app.provider.call_count(), 1);
    assert_eq!(app.provider.calls.lock().unwrap()[0].period.as_str(), "1minute_adjusted_x");
}

#[tokio::test]
async fn test_long_symbol_is_accepted() {
    let app = test_app(ScriptedProvider::default());
    let symbol = "X".repeat(64);
    let uri = format!(
        "/v1/timeseries?symbol={}&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T09:31:00Z",
        symbol
    );
    let (status, _, body) = get(&app.router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["symbol"], symbol);
}

#[tokio::test(start_paused = true)]
async fn test_slow_but_healthy_upstream_is_not_cut_off_by_request_timeout() {
    // 60 buckets, 4 at a time, 10s each: 150s in total against a 60s request deadline
    let provider = ScriptedProvider {
        latency: Some(Duration::from_secs(10)),
        ..Default::default()
    };
    let settings = ResolverSettings {
        ttl: Duration::from_secs(600),
        fetch_timeout: Duration::from_secs(30),
        max_concurrent_fetches: 4,
        max_buckets: 10_000,
    };
    let app = test_app_with(provider, settings, Duration::from_secs(60));

    let (status, cache, body) = get(
        &app.router,
        "/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T10:30:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(body.as_array().unwrap().len(), 120);
    assert_eq!(app.provider.call_count(), 60);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_slower_than_fetch_timeout_returns_500() {
    let provider = ScriptedProvider {
        latency: Some(Duration::from_secs(45)),
        ..Default::default()
    };
    let settings = ResolverSettings {
        ttl: Duration::from_secs(600),
        fetch_timeout: Duration::from_secs(30),
        max_concurrent_fetches: 4,
        max_buckets: 10_000,
    };
    let app = test_app_with(provider, settings, Duration::from_secs(60));

    let (status, _, body) = get(&app.router, RANGE_URI).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch data from external API");
}
