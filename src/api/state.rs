use crate::application::RangeResolver;
use crate::domain::CacheStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<RangeResolver>,
    pub store: Arc<dyn CacheStore>,
    pub metrics: Option<PrometheusHandle>,
}
