//! Bucket partitioner.
//!
//! Splits `[start, end)` into consecutive buckets of the period's native width.
//! Buckets are anchored at `start` and the last bucket is clamped to `end`, so
//! a merged result never extends past the requested range.

use crate::domain::{Bucket, Period, SeriesWindow};
use chrono::{DateTime, TimeDelta, Utc};

/// Partition a range into ordered, non-overlapping buckets covering `[start, end)`.
///
/// - `start >= end` yields no buckets.
/// - An unknown period yields exactly one bucket spanning the whole range.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use timeseries_cache_gateway::domain::{partition, Period};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
/// let buckets = partition("AAPL", &Period::OneMinute, t0, t0 + TimeDelta::seconds(150));
/// assert_eq!(buckets.len(), 3);
/// assert_eq!(buckets[2].end(), t0 + TimeDelta::seconds(150));
/// ```
pub fn partition(
    symbol: &str,
    period: &Period,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<Bucket> {
    if start >= end {
        return Vec::new();
    }

    let Some(step) = period.duration() else {
        return vec![Bucket::new(SeriesWindow::new(symbol, period.clone(), start, end))];
    };

    let mut buckets = Vec::with_capacity(bucket_count(period, start, end));
    let mut cursor = start;
    while cursor < end {
        let bucket_end = (cursor + step).min(end);
        buckets.push(Bucket::new(SeriesWindow::new(
            symbol,
            period.clone(),
            cursor,
            bucket_end,
        )));
        cursor = bucket_end;
    }
    buckets
}

/// Number of buckets [`partition`] would produce, without allocating them.
pub fn bucket_count(period: &Period, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    if start >= end {
        return 0;
    }
    match period.duration() {
        Some(step) => {
            let span = total_nanos(end - start);
            let width = total_nanos(step).max(1);
            ((span + width - 1) / width) as usize
        }
        None => 1,
    }
}

fn total_nanos(delta: TimeDelta) -> i128 {
    i128::from(delta.num_seconds()) * 1_000_000_000 + i128::from(delta.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    fn spans(buckets: &[Bucket]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        buckets.iter().map(|b| (b.start(), b.end())).collect()
    }

    #[test]
    fn test_final_bucket_is_clamped_to_end() {
        let start = t0();
        let buckets = partition("AAPL", &Period::OneMinute, start, start + secs(150));
        assert_eq!(
            spans(&buckets),
            vec![
                (start, start + secs(60)),
                (start + secs(60), start + secs(120)),
                (start + secs(120), start + secs(150)),
            ]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_partial_bucket() {
        let start = t0();
        let buckets = partition("AAPL", &Period::FiveMinutes, start, start + secs(900));
        assert_eq!(buckets.len(), 3);
        assert!(buckets.iter().all(|b| b.window().span() == secs(300)));
    }

    #[test]
    fn test_range_shorter_than_period_is_single_bucket() {
        let start = t0();
        let buckets = partition("AAPL", &Period::OneDay, start, start + secs(90));
        assert_eq!(spans(&buckets), vec![(start, start + secs(90))]);
    }

    #[test]
    fn test_unknown_period_yields_whole_range() {
        let start = t0();
        let end = start + TimeDelta::days(3);
        let buckets = partition("AAPL", &Period::parse("bogus"), start, end);
        assert_eq!(spans(&buckets), vec![(start, end)]);
        assert_eq!(buckets[0].window().period, Period::Unknown("bogus".to_string()));
    }

    #[test]
    fn test_empty_and_inverted_ranges_yield_nothing() {
        let start = t0();
        assert!(partition("AAPL", &Period::OneMinute, start, start).is_empty());
        assert!(partition("AAPL", &Period::OneMinute, start + secs(10), start).is_empty());
        assert!(partition("AAPL", &Period::parse("bogus"), start, start).is_empty());
    }

    #[test]
    fn test_buckets_cover_range_without_gaps_or_overlaps() {
        let start = t0();
        let periods = [
            Period::OneMinute,
            Period::FiveMinutes,
            Period::FifteenMinutes,
            Period::OneHour,
            Period::FourHours,
            Period::OneDay,
        ];
        for period in &periods {
            for len in [1, 59, 60, 61, 299, 3_601, 86_399, 200_000] {
                let end = start + secs(len);
                let buckets = partition("MSFT", period, start, end);
                assert!(!buckets.is_empty());
                assert_eq!(buckets.first().map(|b| b.start()), Some(start));
                assert_eq!(buckets.last().map(|b| b.end()), Some(end));
                for pair in buckets.windows(2) {
                    assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap for {} {}", period, len);
                }
                let step = period.duration().unwrap();
                assert!(buckets.iter().all(|b| b.window().span() <= step && b.start() < b.end()));
            }
        }
    }

    #[test]
    fn test_bucket_count_matches_partition() {
        let start = t0();
        for len in [0, 1, 60, 61, 150, 86_400] {
            let end = start + secs(len);
            assert_eq!(
                bucket_count(&Period::OneMinute, start, end),
                partition("AAPL", &Period::OneMinute, start, end).len()
            );
        }
        assert_eq!(bucket_count(&Period::parse("bogus"), start, start + secs(5)), 1);
    }

    #[test]
    fn test_bucket_count_matches_partition_below_a_millisecond() {
        let start = t0();
        let end = start + secs(60) + TimeDelta::nanoseconds(500);
        let buckets = partition("AAPL", &Period::OneMinute, start, end);
        assert_eq!(buckets.len(), 2);
        assert_eq!(bucket_count(&Period::OneMinute, start, end), 2);
        assert_eq!(buckets[1].end(), end);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let start = t0();
        let end = start + TimeDelta::hours(5) + secs(17);
        let first = partition("AAPL", &Period::OneHour, start, end);
        let second = partition("AAPL", &Period::OneHour, start, end);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bucket_keys_carry_symbol_and_period() {
        let start = t0();
        let buckets = partition("AAPL", &Period::OneMinute, start, start + secs(120));
        let keys: Vec<_> = buckets.iter().map(Bucket::key).collect();
        assert_eq!(
            keys[1],
            crate::domain::CacheKey::Bucket(SeriesWindow::new(
                "AAPL",
                Period::OneMinute,
                start + secs(60),
                start + secs(120)
            ))
        );
    }
}
