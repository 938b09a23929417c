use crate::api::doc::ApiDoc;
use crate::api::handlers::{health_handler, metrics_handler};
use crate::api::state::AppState;
use crate::api::timeseries_handlers::{cache_stats_handler, current_snapshot_handler, timeseries_handler};
use axum::{routing::get, Router};

use axum::http::HeaderValue;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the CORS layer from a comma-separated origin list (`*` for any).
fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins == "*" {
        return CorsLayer::permissive();
    }

    let origin_values: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<HeaderValue>().ok()
            }
        })
        .collect();

    if origin_values.is_empty() {
        tracing::warn!("No valid CORS origins found, falling back to permissive CORS");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origin_values))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn create_router(state: AppState, allowed_origins: &str, request_timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                    let status = response.status().as_u16();
                    metrics::counter!("http_requests_total", "status" => status.to_string(), "status_class" => format!("{}xx", status / 100))
                        .increment(1);
                    metrics::histogram!("http_request_duration_seconds", "status" => status.to_string())
                        .record(latency.as_secs_f64());

                    if latency.as_millis() > 1000 {
                        tracing::warn!("Slow HTTP request: {}ms", latency.as_millis());
                    }
                }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(cors_layer(allowed_origins));

    // Everything except range resolution answers from local state and gets a
    // request deadline. Range requests are bounded by the per-fetch upstream
    // timeout instead, which surfaces as a 500 rather than a 408.
    let bounded = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // System endpoints (no versioning)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/timeseries/current", get(current_snapshot_handler))
        .route("/v1/cache/stats", get(cache_stats_handler))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    Router::new()
        .route("/v1/timeseries", get(timeseries_handler))
        .merge(bounded)
        .layer(middleware)
        .with_state(state)
}
