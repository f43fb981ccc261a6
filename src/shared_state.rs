use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::services::forecast_pipeline::ForecastPipeline;
use crate::services::history_jobs::HistoryJobService;

/// Long-lived services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ForecastPipeline>,
    pub jobs: Arc<HistoryJobService>,
}

impl AppState {
    pub fn new(pipeline: Arc<ForecastPipeline>, jobs: Arc<HistoryJobService>) -> Self {
        Self { pipeline, jobs }
    }
}

/// Router state. Handlers extract `State<AppState>` and/or `State<Config>`
/// through `FromRef`, so one `.with_state(shared)` covers both.
#[derive(Clone)]
pub struct SharedState {
    pub app: AppState,
    pub config: Arc<Config>,
}

impl FromRef<SharedState> for AppState {
    fn from_ref(shared: &SharedState) -> Self {
        shared.app.clone()
    }
}

impl FromRef<SharedState> for Arc<Config> {
    fn from_ref(shared: &SharedState) -> Self {
        Arc::clone(&shared.config)
    }
}
