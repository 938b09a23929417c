//! Domain layer - Core time-series entities and repository traits.
//!
//! This module defines the domain model for the time-series cache gateway,
//! following clean architecture principles. It contains:
//! - Value types for periods, windows, buckets and cache keys
//! - The pure bucket partitioner
//! - Traits for the upstream provider and the cache store
//! - Error kinds and application configuration

pub mod config;
pub mod error;
pub mod partition;
pub mod series;

pub use config::{AppConfig, CacheConfig, RefresherConfig, ServerConfig, UpstreamConfig};
pub use error::GatewayError;
pub use partition::{bucket_count, partition};
pub use series::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Shared, immutable payload of one cache entry.
///
/// Entries are cloned out of the store by reference count, so a cache hit
/// never copies the records themselves.
pub type Payload = Arc<Vec<Record>>;

/// Trait for the upstream time-series provider.
///
/// Implementations must be thread-safe (`Send + Sync`) since fetches run on
/// spawned tasks.
///
/// # Implementations
///
/// See `infrastructure::upstream_client::HttpUpstreamProvider` for the HTTP implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Fetch the ordered records of exactly `window`.
    ///
    /// # Errors
    ///
    /// - Returns error if network communication fails
    /// - Returns error if the provider answers with a non-success status
    /// - Returns error if the body is not a JSON array of records
    async fn fetch(&self, window: &SeriesWindow) -> anyhow::Result<Vec<Record>>;
}

/// Trait for the cache store.
///
/// Each entry carries its own expiry; setting one key never affects another.
/// Expired entries behave exactly like keys that were never set.
///
/// # Implementations
///
/// See `infrastructure::memory_cache::MemoryCacheStore`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieve a live entry.
    ///
    /// Returns `Ok(None)` for missing and expired keys alike.
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Payload>>;

    /// Insert or overwrite an entry that expires after `ttl`.
    async fn set(&self, key: CacheKey, payload: Payload, ttl: Duration) -> anyhow::Result<()>;

    /// Snapshot of store counters.
    async fn stats(&self) -> CacheStats;
}

/// Cache store counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    /// Entries currently held (may include expired entries not yet swept)
    pub entries: usize,
    /// Successful lookups
    pub hits: u64,
    /// Lookups for missing or expired keys
    pub misses: u64,
    /// Entries removed because their TTL elapsed
    pub evictions: u64,
}
