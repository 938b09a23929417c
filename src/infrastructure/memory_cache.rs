//! In-process cache store with per-key expiry.
//!
//! Expired entries are dropped lazily on access and actively by a sweeper
//! task running on a fixed cadence. Expiry uses `tokio::time::Instant`, so a
//! paused test clock drives it deterministically.

use crate::domain::{CacheKey, CacheStats, CacheStore, Payload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

struct CacheEntry {
    payload: Payload,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-wide cache store shared by the resolver and the refresher.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns the number of evicted entries.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            metrics::counter!("cache_evictions_total").increment(evicted as u64);
        }
        evicted
    }

    /// Spawn the background sweeper. The first sweep runs one `every` after start.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!("Cache sweeper started: every {}s", every.as_secs());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let evicted = self.sweep().await;
                if evicted > 0 {
                    debug!("Cache sweep evicted {} expired entries", evicted);
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Payload>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.payload.clone()));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        // Expired: drop it now instead of waiting for the sweeper. Re-check
        // under the write lock since a concurrent set may have refreshed it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.payload.clone()));
            }
            entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache_evictions_total").increment(1);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: CacheKey, payload: Payload, ttl: Duration) -> anyhow::Result<()> {
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
