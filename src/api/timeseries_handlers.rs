//! HTTP handlers for time-series range queries.
//!
//! The range handler is the caller of the resolver: it validates parameters,
//! maps errors to status codes, and populates the whole-range cache entry
//! after a successful assembly.

use crate::api::handlers::{error_response, ErrorResponse};
use crate::api::state::AppState;
use crate::application::CacheOutcome;
use crate::domain::{CacheKey, CacheStats, GatewayError, Period, RangeQuery, Record};
use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, instrument};
use utoipa::IntoParams;
use validator::Validate;

#[allow(unused_imports)]
use serde_json::json; // Used in utoipa::path examples

/// Response header reporting how the range was served (`HIT`, `PARTIAL`, `MISS`).
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Query parameters for the range endpoint. All four are mandatory.
#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
pub struct TimeSeriesQuery {
    /// Instrument symbol
    #[param(example = "AAPL")]
    #[validate(length(min = 1))]
    pub symbol: Option<String>,
    /// Sampling period (1min, 5min, 15min, 30min, 1hour, 4hour, 1day, 1week)
    #[param(example = "1min")]
    #[validate(length(min = 1))]
    pub period: Option<String>,
    /// Range start, inclusive (RFC 3339)
    #[param(example = "2024-01-02T09:30:00Z")]
    pub start: Option<String>,
    /// Range end, exclusive (RFC 3339)
    #[param(example = "2024-01-02T10:30:00Z")]
    pub end: Option<String>,
}

impl TimeSeriesQuery {
    /// Turn raw parameters into a validated range query.
    pub fn into_range_query(self) -> Result<RangeQuery, GatewayError> {
        let (Some(symbol), Some(period), Some(start), Some(end)) =
            (self.symbol, self.period, self.start, self.end)
        else {
            return Err(GatewayError::InvalidRange(
                "Symbol, period, start time, and end time are required".to_string(),
            ));
        };
        let start = parse_timestamp("start", &start)?;
        let end = parse_timestamp("end", &end)?;
        RangeQuery::new(symbol, Period::parse(&period), start, end)
    }
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| GatewayError::InvalidRange(format!("{} is not an RFC 3339 timestamp ({}): {}", name, raw, e)))
}

/// Get time-series records for a range
#[utoipa::path(
    get,
    path = "/v1/timeseries",
    params(TimeSeriesQuery),
    responses(
        (status = 200, description = "Records covering [start, end) in chronological order", body = Vec<serde_json::Value>,
            example = json!([
                { "t": "2024-01-02T09:30:00Z", "open": 187.1, "high": 187.4, "low": 186.9, "close": 187.2, "volume": 51200 }
            ])
        ),
        (status = 400, description = "Missing parameters or invalid range", body = ErrorResponse,
            example = json!({"error": "Symbol, period, start time, and end time are required"})
        ),
        (status = 500, description = "Upstream provider failed", body = ErrorResponse,
            example = json!({"error": "Failed to fetch data from external API"})
        )
    ),
    description = "Serves as much of the range as possible from cached buckets and fetches only the missing buckets from the upstream provider.",
    tag = "timeseries"
)]
#[instrument(skip(state), fields(symbol = ?query.symbol, period = ?query.period))]
pub async fn timeseries_handler(
    Query(query): Query<TimeSeriesQuery>,
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if let Err(e) = query.validate() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Validation failed",
            Some(e.to_string()),
        ));
    }

    metrics::counter!("api_requests_total", "endpoint" => "timeseries").increment(1);

    let range = query.into_range_query().map_err(map_gateway_error)?;
    let resolved = state
        .resolver
        .resolve_range(&range)
        .await
        .map_err(map_gateway_error)?;

    if resolved.outcome != CacheOutcome::RangeHit {
        state.resolver.remember_range(&range, resolved.records.clone()).await;
    }

    let label = resolved.outcome.label();
    let records: Vec<Record> = resolved.into_records();
    Ok((
        [(X_CACHE, HeaderValue::from_static(label))],
        Json(records),
    )
        .into_response())
}

fn map_gateway_error(e: GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        GatewayError::InvalidRange(msg) => {
            error_response(StatusCode::BAD_REQUEST, msg, None)
        }
        upstream @ GatewayError::UpstreamFetch { .. } => {
            error!("{}", upstream);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch data from external API",
                Some(upstream.to_string()),
            )
        }
    }
}

/// Get the most recent snapshot kept warm by the background refresher
#[utoipa::path(
    get,
    path = "/v1/timeseries/current",
    responses(
        (status = 200, description = "Latest refreshed window", body = Vec<serde_json::Value>),
        (status = 404, description = "No snapshot yet", body = ErrorResponse)
    ),
    tag = "timeseries"
)]
pub async fn current_snapshot_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Record>>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get(&CacheKey::CurrentSnapshot).await {
        Ok(Some(records)) => Ok(Json(records.as_ref().clone())),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            "No current snapshot available yet",
            None,
        )),
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read current snapshot",
            Some(e.to_string()),
        )),
    }
}

/// Get cache statistics
#[utoipa::path(
    get,
    path = "/v1/cache/stats",
    responses(
        (status = 200, description = "Cache statistics", body = CacheStats)
    ),
    tag = "Cache"
)]
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.store.stats().await)
}
