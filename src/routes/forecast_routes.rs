use axum::{
    Router,
    routing::{get, post},
};

use crate::controllers::admin_controller::{cache_coverage, cache_select, cache_stats, health, ready, topic_samples};
use crate::controllers::forecast_controller::{available, compute, predict, weather};
use crate::controllers::job_controller::{generate_history, generate_topics, get_job};
use crate::controllers::topic_controller::{list_topic_specs, list_topics};
use crate::shared_state::SharedState;

/// Probes at the root, everything else under `/api`.
pub fn app_routes(shared: SharedState) -> Router {
    let api = Router::new()
        // Topics
        .route("/topics",                 get(list_topics))
        .route("/topics/specs",           get(list_topic_specs))
        // Forecasts
        .route("/predict",                post(predict))
        .route("/forecasts/available",    get(available))
        .route("/forecasts/compute",      post(compute))
        .route("/weather/{topic}",        get(weather))
        // History jobs
        .route("/jobs/generate-history",  post(generate_history))
        .route("/jobs/{id}",              get(get_job))
        // Cache administration
        .route("/admin/cache/stats",      get(cache_stats))
        .route("/admin/cache/coverage",   get(cache_coverage))
        .route("/admin/cache/topic-samples", get(topic_samples))
        .route("/admin/cache/select",     post(cache_select))
        .route("/admin/jobs/generate",    post(generate_topics));

    Router::new()
        .route("/health", get(health))
        .route("/ready",  get(ready))
        .nest("/api", api)
        .with_state(shared)
}
