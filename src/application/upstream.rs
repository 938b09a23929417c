//! Timeout-bounded upstream calls shared by the resolver and the refresher.

use crate::domain::{GatewayError, Record, SeriesWindow, UpstreamProvider};
use std::time::Duration;
use tracing::warn;

/// Fetch one window from the provider, bounding the wait by `timeout`.
///
/// Provider errors and timeouts both collapse into [`GatewayError::UpstreamFetch`].
pub async fn fetch_window(
    provider: &dyn UpstreamProvider,
    window: &SeriesWindow,
    timeout: Duration,
) -> Result<Vec<Record>, GatewayError> {
    let outcome = tokio::time::timeout(timeout, provider.fetch(window)).await;
    let result = match outcome {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e)) => Err(GatewayError::upstream(window, format!("{:#}", e))),
        Err(_) => Err(GatewayError::upstream(
            window,
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    };

    match &result {
        Ok(_) => {
            metrics::counter!("upstream_fetches_total", "outcome" => "success").increment(1);
        }
        Err(e) => {
            warn!("{}", e);
            metrics::counter!("upstream_fetches_total", "outcome" => "failure").increment(1);
        }
    }
    result
}
