//! Time-Series Cache Gateway
//!
//! A REST gateway answering time-series range queries from a bucketed local
//! cache, fetching only the missing buckets from an upstream data provider.
//!
//! # Architecture
//!
//! The gateway follows clean/onion architecture with clear separation of concerns:
//! - **Domain**: Periods, buckets, cache keys, the partitioner and the provider/cache traits
//! - **Application**: Range resolution (merge-fetch) and the background snapshot refresher
//! - **Infrastructure**: In-process TTL cache store and the HTTP upstream client
//! - **API**: HTTP handlers, routing, and middleware
//!
//! # Configuration
//!
//! The gateway is configured via `config.yaml` and environment variables:
//! - `CONFIG_PATH`: Path to the YAML config (default: config.yaml)
//! - `UPSTREAM_URL`: Overrides `upstream.base_url`
//! - `PORT`: Overrides `server.port`
//! - `RUST_LOG`: Logging level (default: info)
//! - `LOG_FORMAT`: `text` (default) or `json`
//!
//! # Quick Start
//!
//! ```bash
//! export UPSTREAM_URL="http://localhost:9000/bars"
//! cargo run --release
//!
//! curl "http://localhost:3000/v1/timeseries?symbol=AAPL&period=1min&start=2024-01-02T09:30:00Z&end=2024-01-02T10:30:00Z"
//! curl http://localhost:3000/v1/timeseries/current
//! ```

use anyhow::Context;
use std::env;
use std::sync::Arc;
use timeseries_cache_gateway::api::routes::create_router;
use timeseries_cache_gateway::api::state::AppState;
use timeseries_cache_gateway::application::{RangeResolver, ResolverSettings, SnapshotRefresher};
use timeseries_cache_gateway::domain::{AppConfig, CacheStore, UpstreamProvider};
use timeseries_cache_gateway::infrastructure::{HttpUpstreamProvider, MemoryCacheStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load Config
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let mut config = if std::path::Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        tracing::warn!("{} not found, using built-in defaults", config_path);
        AppConfig::default()
    };
    if let Ok(url) = env::var("UPSTREAM_URL") {
        config.upstream.base_url = url;
    }

    let metrics = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    };

    // Infrastructure
    let store = Arc::new(MemoryCacheStore::new());
    let provider: Arc<dyn UpstreamProvider> = Arc::new(
        HttpUpstreamProvider::new(&config.upstream.base_url, config.upstream.timeout())
            .context("Failed to build upstream client")?,
    );
    tracing::info!("Upstream provider: {}", config.upstream.base_url);

    let sweeper = store.clone().spawn_sweeper(config.cache.sweep_interval());
    let shared_store: Arc<dyn CacheStore> = store;

    // Application
    let resolver = Arc::new(RangeResolver::new(
        provider.clone(),
        shared_store.clone(),
        ResolverSettings::from_config(&config.cache, &config.upstream),
    ));

    let refresher = if config.refresher.enabled {
        let refresher = Arc::new(SnapshotRefresher::new(
            provider,
            shared_store.clone(),
            &config.refresher,
            config.cache.ttl(),
            config.upstream.timeout(),
        ));
        Some(refresher.spawn())
    } else {
        tracing::info!("Snapshot refresher disabled");
        None
    };

    let state = AppState {
        resolver,
        store: shared_store,
        metrics,
    };

    let app = create_router(
        state,
        &config.server.allowed_origins,
        std::time::Duration::from_secs(config.server.request_timeout_secs),
    );

    // Allow PORT env var override
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Server is running at http://{}", addr);

    // Graceful shutdown handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error during operation")?;

    sweeper.abort();
    if let Some(handle) = refresher {
        handle.abort();
    }
    tracing::info!("Background tasks stopped");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) to initiate graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
