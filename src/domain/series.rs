//! Time-series value types shared by the partitioner, the cache and the API.
//!
//! A [`SeriesWindow`] names a half-open interval `[start, end)` of one symbol
//! sampled at one [`Period`]. Buckets, range queries and cache keys are all
//! built on top of it so that every cache lookup uses a structured key.

use crate::domain::GatewayError;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single time-series record as returned by the upstream provider.
///
/// Records are opaque to the gateway: they are stored and returned verbatim.
pub type Record = serde_json::Value;

// ============================================================================
// Period
// ============================================================================

/// Sampling granularity of a series.
///
/// Unrecognised period strings are preserved in [`Period::Unknown`] and still
/// forwarded to the provider; they simply get no sub-partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Period {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
    Unknown(String),
}

impl Period {
    /// Parse a period string such as `"1min"` or `"1hour"`.
    ///
    /// Matching is exact and case-sensitive.
    pub fn parse(s: &str) -> Self {
        match s {
            "1min" => Period::OneMinute,
            "5min" => Period::FiveMinutes,
            "15min" => Period::FifteenMinutes,
            "30min" => Period::ThirtyMinutes,
            "1hour" => Period::OneHour,
            "4hour" => Period::FourHours,
            "1day" => Period::OneDay,
            "1week" => Period::OneWeek,
            other => Period::Unknown(other.to_string()),
        }
    }

    /// Wire representation sent to the upstream provider.
    pub fn as_str(&self) -> &str {
        match self {
            Period::OneMinute => "1min",
            Period::FiveMinutes => "5min",
            Period::FifteenMinutes => "15min",
            Period::ThirtyMinutes => "30min",
            Period::OneHour => "1hour",
            Period::FourHours => "4hour",
            Period::OneDay => "1day",
            Period::OneWeek => "1week",
            Period::Unknown(raw) => raw,
        }
    }

    /// Native bucket width, or `None` for an unknown period.
    pub fn duration(&self) -> Option<TimeDelta> {
        let secs = match self {
            Period::OneMinute => 60,
            Period::FiveMinutes => 300,
            Period::FifteenMinutes => 900,
            Period::ThirtyMinutes => 1_800,
            Period::OneHour => 3_600,
            Period::FourHours => 14_400,
            Period::OneDay => 86_400,
            Period::OneWeek => 604_800,
            Period::Unknown(_) => return None,
        };
        Some(TimeDelta::seconds(secs))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Period::Unknown(_))
    }
}

impl From<&str> for Period {
    fn from(s: &str) -> Self {
        Period::parse(s)
    }
}

impl From<String> for Period {
    fn from(s: String) -> Self {
        Period::parse(&s)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Windows, buckets and queries
// ============================================================================

/// Format a timestamp the way the upstream provider expects (ISO-8601, UTC, millis).
///
/// Sub-millisecond instants keep their full precision so that two distinct
/// bucket boundaries never reach the provider as the same string.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let format = if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::AutoSi
    };
    ts.to_rfc3339_opts(format, true)
}

/// Half-open interval `[start, end)` of one symbol at one period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesWindow {
    pub symbol: String,
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SeriesWindow {
    pub fn new(
        symbol: impl Into<String>,
        period: Period,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            start,
            end,
        }
    }

    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl fmt::Display for SeriesWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}, {})",
            self.symbol,
            self.period,
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

/// A period-aligned sub-interval of a requested range; the unit of caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    window: SeriesWindow,
}

impl Bucket {
    pub fn new(window: SeriesWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &SeriesWindow {
        &self.window
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.window.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.window.end
    }

    /// Cache identity of this bucket.
    pub fn key(&self) -> CacheKey {
        CacheKey::Bucket(self.window.clone())
    }
}

/// A validated client range query. Construction guarantees `start < end`
/// and a non-empty symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    window: SeriesWindow,
}

impl RangeQuery {
    pub fn new(
        symbol: impl Into<String>,
        period: Period,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, GatewayError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(GatewayError::InvalidRange("symbol must not be empty".to_string()));
        }
        if start >= end {
            return Err(GatewayError::InvalidRange(format!(
                "start ({}) must be before end ({})",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self {
            window: SeriesWindow::new(symbol, period, start, end),
        })
    }

    pub fn window(&self) -> &SeriesWindow {
        &self.window
    }

    pub fn symbol(&self) -> &str {
        &self.window.symbol
    }

    pub fn period(&self) -> &Period {
        &self.window.period
    }

    /// Key of the whole-range fast path entry.
    pub fn range_key(&self) -> CacheKey {
        CacheKey::Range(self.window.clone())
    }
}

// ============================================================================
// Cache keys
// ============================================================================

/// Structured cache identity.
///
/// `Range` and `Bucket` entries for the same interval are distinct keys, and
/// the refresher slot can never collide with either.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Whole-range result populated by the HTTP caller.
    Range(SeriesWindow),
    /// One partitioned bucket.
    Bucket(SeriesWindow),
    /// Most recent window kept warm by the refresher.
    CurrentSnapshot,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Range(w) => write!(f, "range:{}", w),
            CacheKey::Bucket(w) => write!(f, "bucket:{}", w),
            CacheKey::CurrentSnapshot => f.write_str("current"),
        }
    }
}
