use crate::application::AppIntelService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub intel_service: Arc<AppIntelService>,
    /// Installed once in `main`; absent in tests
    pub metrics_handle: Option<PrometheusHandle>,
}
