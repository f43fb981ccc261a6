use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{Days, NaiveTime};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::models::forecast::{CacheSelection, CacheStats, Coverage, TopicSamples};
use crate::models::requests::{CacheSelectRequest, CoverageQuery, TopicSamplesQuery, admin_limit, parse_date};
use crate::shared_state::AppState;

/// GET /health
/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is up"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /ready
/// Readiness probe
///
/// Pings the forecast cache; 503 when it cannot be reached.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Cache reachable"),
        (status = 503, description = "Cache unavailable")
    )
)]
pub async fn ready(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    app.pipeline.with_cache(|cache| cache.ping()).await?;
    Ok(Json(json!({ "status": "ready" })))
}

/// GET /api/admin/cache/stats
#[utoipa::path(
    get,
    path = "/api/admin/cache/stats",
    responses(
        (status = 200, description = "Totals over every partition", body = CacheStats),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn cache_stats(State(app): State<AppState>) -> Result<Json<CacheStats>, ApiError> {
    Ok(Json(app.pipeline.with_cache(|cache| cache.stats()).await?))
}

/// GET /api/admin/cache/topic-samples
/// Per-topic count and time span
#[utoipa::path(
    get,
    path = "/api/admin/cache/topic-samples",
    params(TopicSamplesQuery),
    responses(
        (status = 200, description = "Topics in tag order", body = TopicSamples),
        (status = 400, description = "Limit out of range"),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn topic_samples(
    State(app): State<AppState>,
    Query(query): Query<TopicSamplesQuery>,
) -> Result<Json<TopicSamples>, ApiError> {
    let limit = admin_limit(query.limit, 50)?;
    let items = app.pipeline.with_cache(move |cache| cache.topic_samples(limit)).await?;
    Ok(Json(TopicSamples { items }))
}

/// GET /api/admin/cache/coverage
/// Points stored for one topic-day
#[utoipa::path(
    get,
    path = "/api/admin/cache/coverage",
    params(CoverageQuery),
    responses(
        (status = 200, description = "Count and time span", body = Coverage),
        (status = 400, description = "Bad date"),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn cache_coverage(
    State(app): State<AppState>,
    Query(query): Query<CoverageQuery>,
) -> Result<Json<Coverage>, ApiError> {
    let date = parse_date("date", &query.date)?;
    let topic = query.topic;
    Ok(Json(app.pipeline.with_cache(move |cache| cache.coverage(&topic, date)).await?))
}

/// POST /api/admin/cache/select
/// Raw cached points of one topic-day
///
/// Points come back in time order, at most `limit` of them, with the count and
/// the span of what was returned.
#[utoipa::path(
    post,
    path = "/api/admin/cache/select",
    request_body = CacheSelectRequest,
    responses(
        (status = 200, description = "Cached points", body = CacheSelection),
        (status = 400, description = "Bad date or limit"),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn cache_select(
    State(app): State<AppState>,
    Json(req): Json<CacheSelectRequest>,
) -> Result<Json<CacheSelection>, ApiError> {
    let date = parse_date("date", &req.date)?;
    let limit = admin_limit(req.limit, 200)?;
    let start = date.and_time(NaiveTime::MIN);
    let end = start + Days::new(1);

    let topics = vec![req.topic.clone()];
    let mut rows = app
        .pipeline
        .with_cache(move |cache| cache.select(&topics, start, end))
        .await?
        .remove(&req.topic)
        .unwrap_or_default();
    rows.truncate(limit);
    Ok(Json(CacheSelection::new(req.topic, req.date, &rows)))
}
