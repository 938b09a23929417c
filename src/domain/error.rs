//! Error kinds surfaced by range resolution.

use crate::domain::SeriesWindow;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Missing parameters, unparsable timestamps or `start >= end`.
    /// Raised before the cache or the provider is touched.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The provider failed or timed out for one window.
    #[error("Upstream fetch failed for {window}: {reason}")]
    UpstreamFetch { window: SeriesWindow, reason: String },
}

impl GatewayError {
    pub fn upstream(window: &SeriesWindow, reason: impl Into<String>) -> Self {
        GatewayError::UpstreamFetch {
            window: window.clone(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_range(&self) -> bool {
        matches!(self, GatewayError::InvalidRange(_))
    }
}
