//! Merge-fetch orchestration for range queries.
//!
//! A range is served from the whole-range cache entry when present. Otherwise
//! it is partitioned into buckets, cached buckets are reused, missing buckets
//! are fetched from the provider (and cached), and everything is concatenated
//! in bucket order.

use crate::application::upstream::fetch_window;
use crate::domain::{
    bucket_count, partition, Bucket, CacheConfig, CacheKey, CacheStore, GatewayError, Payload,
    RangeQuery, Record, UpstreamConfig, UpstreamProvider,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for range resolution.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// TTL applied to every bucket and whole-range entry
    pub ttl: Duration,
    /// Bound on each provider call
    pub fetch_timeout: Duration,
    /// Missing buckets fetched in parallel
    pub max_concurrent_fetches: usize,
    /// Requests partitioning into more buckets are rejected
    pub max_buckets: usize,
}

impl ResolverSettings {
    pub fn from_config(cache: &CacheConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            ttl: cache.ttl(),
            fetch_timeout: upstream.timeout(),
            max_concurrent_fetches: upstream.max_concurrent_fetches.max(1),
            max_buckets: cache.max_buckets,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default(), &UpstreamConfig::default())
    }
}

/// How a range was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Whole-range entry hit; nothing was partitioned.
    RangeHit,
    /// Assembled from buckets.
    Assembled { cached: usize, fetched: usize },
}

impl CacheOutcome {
    /// Short label used for the `x-cache` response header.
    pub fn label(&self) -> &'static str {
        match self {
            CacheOutcome::RangeHit => "HIT",
            CacheOutcome::Assembled { fetched: 0, .. } => "HIT",
            CacheOutcome::Assembled { cached: 0, .. } => "MISS",
            CacheOutcome::Assembled { .. } => "PARTIAL",
        }
    }
}

/// Merged, chronologically ordered records for one range query.
#[derive(Debug, Clone)]
pub struct ResolvedRange {
    pub records: Payload,
    pub outcome: CacheOutcome,
}

impl ResolvedRange {
    pub fn into_records(self) -> Vec<Record> {
        Arc::unwrap_or_clone(self.records)
    }
}

/// Resolves range queries against the shared cache and the upstream provider.
pub struct RangeResolver {
    provider: Arc<dyn UpstreamProvider>,
    store: Arc<dyn CacheStore>,
    settings: ResolverSettings,
}

impl RangeResolver {
    pub fn new(
        provider: Arc<dyn UpstreamProvider>,
        store: Arc<dyn CacheStore>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    /// Resolve a range query into one ordered sequence of records.
    ///
    /// Flow:
    /// 1. Whole-range cache entry
    /// 2. Partition into buckets and probe each bucket
    /// 3. Fetch the missing buckets & cache them
    /// 4. Concatenate in bucket order
    ///
    /// Any failed fetch fails the whole request. Buckets fetched successfully
    /// before the failure stay cached.
    pub async fn resolve_range(&self, query: &RangeQuery) -> Result<ResolvedRange, GatewayError> {
        let window = query.window();

        // 1. Whole-range fast path
        if let Some(records) = self.lookup(&query.range_key()).await {
            debug!("Range cache hit: {}", window);
            metrics::counter!("cache_operations_total", "operation" => "hit", "scope" => "range")
                .increment(1);
            return Ok(ResolvedRange {
                records,
                outcome: CacheOutcome::RangeHit,
            });
        }

        // 2. Partition
        let expected = bucket_count(&window.period, window.start, window.end);
        if expected > self.settings.max_buckets {
            return Err(GatewayError::InvalidRange(format!(
                "range spans {} buckets of {} (max: {}); narrow the range or use a coarser period",
                expected, window.period, self.settings.max_buckets
            )));
        }
        let buckets = partition(&window.symbol, &window.period, window.start, window.end);

        // 3. Probe the cache per bucket, keeping each bucket's position
        let mut slots: Vec<Option<Payload>> = Vec::with_capacity(buckets.len());
        let mut pending: Vec<(usize, Bucket)> = Vec::new();
        for (position, bucket) in buckets.into_iter().enumerate() {
            match self.lookup(&bucket.key()).await {
                Some(records) => slots.push(Some(records)),
                None => {
                    slots.push(None);
                    pending.push((position, bucket));
                }
            }
        }

        let cached = slots.len() - pending.len();
        let fetched = pending.len();
        metrics::counter!("cache_operations_total", "operation" => "hit", "scope" => "bucket")
            .increment(cached as u64);
        metrics::counter!("cache_operations_total", "operation" => "miss", "scope" => "bucket")
            .increment(fetched as u64);

        // 4. Fetch misses
        if !pending.is_empty() {
            info!(
                "Range {}: {} cached buckets, fetching {} from upstream",
                window, cached, fetched
            );
            for (position, records) in self.fetch_missing(pending).await? {
                slots[position] = Some(records);
            }
        } else {
            debug!("Range {} fully served from {} cached buckets", window, cached);
        }

        // 5. Concatenate in bucket order
        let total = slots.iter().flatten().map(|records| records.len()).sum();
        let mut merged = Vec::with_capacity(total);
        for records in slots.into_iter().flatten() {
            merged.extend(records.iter().cloned());
        }

        Ok(ResolvedRange {
            records: Arc::new(merged),
            outcome: CacheOutcome::Assembled { cached, fetched },
        })
    }

    /// Store a whole-range result so identical queries skip partitioning.
    pub async fn remember_range(&self, query: &RangeQuery, records: Payload) {
        if let Err(e) = self
            .store
            .set(query.range_key(), records, self.settings.ttl)
            .await
        {
            warn!("Failed to cache range {}: {}", query.window(), e);
        }
    }

    /// Fetch every pending bucket, at most `max_concurrent_fetches` at a time.
    ///
    /// Each fetch runs on its own task so that it completes, and populates the
    /// cache, even if the requesting future is dropped.
    async fn fetch_missing(
        &self,
        pending: Vec<(usize, Bucket)>,
    ) -> Result<Vec<(usize, Payload)>, GatewayError> {
        let outcomes = futures::stream::iter(pending)
            .map(|(position, bucket)| {
                let provider = self.provider.clone();
                let store = self.store.clone();
                let ttl = self.settings.ttl;
                let timeout = self.settings.fetch_timeout;
                let window = bucket.window().clone();
                let task = tokio::spawn(async move {
                    fetch_and_store(provider, store, bucket, ttl, timeout).await
                });
                async move {
                    let outcome = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(GatewayError::upstream(&window, format!("fetch task failed: {}", e))),
                    };
                    (position, outcome)
                }
            })
            .buffer_unordered(self.settings.max_concurrent_fetches)
            .collect::<Vec<_>>()
            .await;

        let mut fetched = Vec::with_capacity(outcomes.len());
        let mut first_failure: Option<(usize, GatewayError)> = None;
        for (position, outcome) in outcomes {
            match outcome {
                Ok(records) => fetched.push((position, records)),
                Err(e) => {
                    // report the chronologically earliest failure
                    if first_failure.as_ref().map_or(true, |(p, _)| position < *p) {
                        first_failure = Some((position, e));
                    }
                }
            }
        }

        match first_failure {
            Some((_, e)) => Err(e),
            None => Ok(fetched),
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Payload> {
        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }
}

async fn fetch_and_store(
    provider: Arc<dyn UpstreamProvider>,
    store: Arc<dyn CacheStore>,
    bucket: Bucket,
    ttl: Duration,
    timeout: Duration,
) -> Result<Payload, GatewayError> {
    let records = Arc::new(fetch_window(provider.as_ref(), bucket.window(), timeout).await?);
    if let Err(e) = store.set(bucket.key(), records.clone(), ttl).await {
        warn!("Failed to cache bucket {}: {}", bucket.window(), e);
    }
    Ok(records)
}
