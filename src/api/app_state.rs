use crate::observability::PipelineMetrics;
use crate::services::nugget::NuggetService;
use crate::services::orchestrator::TurnOrchestrator;
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Turn pipeline and graph reads
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Nugget listing, feedback and status
    pub nugget_service: Arc<dyn NuggetService>,
    /// Pipeline counters exposed on /metrics
    pub metrics: Arc<PipelineMetrics>,
    /// Reported by /health
    pub version: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &"Arc<TurnOrchestrator>")
            .field("nugget_service", &"Arc<dyn NuggetService>")
            .field("metrics", &self.metrics)
            .field("version", &self.version)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(orchestrator: TurnOrchestrator, nugget_service: Arc<dyn NuggetService>) -> Self {
        let metrics = orchestrator.metrics();
        Self {
            orchestrator: Arc::new(orchestrator),
            nugget_service,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
