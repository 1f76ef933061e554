use crate::config::ServiceConfig;
use crate::pipeline::{AvailabilityResponder, DetectionService};
use langdetect_engine::EngineCell;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<ServiceConfig>,

    /// Engine slot written once by the loader
    pub engine: Arc<EngineCell>,

    /// Detection over the engine
    pub service: Arc<DetectionService>,

    /// Prometheus handle for `/metrics`, absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ServiceConfig, engine: Arc<EngineCell>) -> Self {
        let responder = AvailabilityResponder::new(config.public_url());
        let service = DetectionService::new(engine.clone(), responder);
        Self {
            config: Arc::new(config),
            engine,
            service: Arc::new(service),
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn wasm_loaded(&self) -> bool {
        self.engine.is_loaded()
    }
}
