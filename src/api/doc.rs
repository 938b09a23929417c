use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health_handler,
        crate::api::handlers::metrics_handler,
        crate::api::timeseries_handlers::timeseries_handler,
        crate::api::timeseries_handlers::current_snapshot_handler,
        crate::api::timeseries_handlers::cache_stats_handler
    ),
    components(
        schemas(
            crate::api::handlers::HealthResponse,
            crate::api::handlers::ErrorResponse,
            crate::domain::CacheStats
        )
    ),
    tags(
        (name = "system", description = "System endpoints for health checks and metrics"),
        (name = "timeseries", description = "Cached time-series range queries"),
        (name = "Cache", description = "Cache statistics")
    ),
    info(
        title = "Time-Series Cache Gateway",
        version = "0.1.0",
        description = "Serves time-series range queries from a bucketed local cache, fetching only missing buckets from the upstream provider."
    )
)]
pub struct ApiDoc;
