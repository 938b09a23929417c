//! Background refresher for the "current snapshot" cache slot.
//!
//! On a fixed cadence the refresher fetches the most recent window of a
//! configured symbol/period and overwrites [`CacheKey::CurrentSnapshot`]. It
//! bypasses partitioning entirely and never touches bucket entries.

use crate::application::upstream::fetch_window;
use crate::domain::{CacheKey, CacheStore, GatewayError, Period, RefresherConfig, SeriesWindow, UpstreamProvider};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps the current-snapshot slot warm independent of client traffic.
pub struct SnapshotRefresher {
    provider: Arc<dyn UpstreamProvider>,
    store: Arc<dyn CacheStore>,
    symbol: String,
    period: Period,
    window: TimeDelta,
    cadence: Duration,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl SnapshotRefresher {
    pub fn new(
        provider: Arc<dyn UpstreamProvider>,
        store: Arc<dyn CacheStore>,
        config: &RefresherConfig,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            symbol: config.symbol.clone(),
            period: config.period.clone(),
            window: config.window(),
            cadence: config.interval(),
            ttl,
            fetch_timeout,
        }
    }

    /// The window fetched by a tick at `now`: `[now - window, now)`.
    pub fn current_window(&self, now: DateTime<Utc>) -> SeriesWindow {
        SeriesWindow::new(self.symbol.clone(), self.period.clone(), now - self.window, now)
    }

    /// Fetch the window ending at `now` and overwrite the snapshot slot.
    ///
    /// On failure the slot keeps its previous value. Returns the number of
    /// records stored.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<usize, GatewayError> {
        let window = self.current_window(now);
        let records = fetch_window(self.provider.as_ref(), &window, self.fetch_timeout).await?;
        let count = records.len();

        if let Err(e) = self
            .store
            .set(CacheKey::CurrentSnapshot, Arc::new(records), self.ttl)
            .await
        {
            warn!("Failed to store current snapshot: {}", e);
        }
        debug!("Refreshed current snapshot {} ({} records)", window, count);
        Ok(count)
    }

    /// One scheduled tick. Failures are logged and contained; the next tick
    /// runs regardless.
    pub async fn tick(&self) -> bool {
        match self.refresh_at(Utc::now()).await {
            Ok(_) => {
                metrics::counter!("refresher_ticks_total", "outcome" => "success").increment(1);
                true
            }
            Err(e) => {
                warn!("Error refreshing cache: {}", e);
                metrics::counter!("refresher_ticks_total", "outcome" => "failure").increment(1);
                false
            }
        }
    }

    /// Spawn the repeating refresh task. The first tick runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Snapshot refresher started: {}/{} every {}s",
            self.symbol,
            self.period,
            self.cadence.as_secs()
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cadence);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}
