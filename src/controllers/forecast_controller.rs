use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Days, NaiveTime};

use crate::config::Config;
use crate::error::{ApiError, ValidationError};
use crate::models::forecast::{AvailableSummary, ForecastPoint, ForecastResult};
use crate::models::requests::{AvailableQuery, ComputeRequest, PredictRequest, WeatherQuery, parse_date, parse_optional_date};
use crate::models::weather::{SourcePolicy, WeatherFetch};
use crate::services::forecast_cache::AvailableFilter;
use crate::shared_state::AppState;

/// POST /api/predict
/// Cached forecast points for one day
///
/// Returns the points stored for `prediction_date` (00:00 inclusive to the next
/// midnight exclusive) keyed by topic. Topics without points map to an empty list.
#[utoipa::path(
    post,
    path = "/api/predict",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Points per topic", body = BTreeMap<String, Vec<ForecastPoint>>),
        (status = 400, description = "Bad date or topic list"),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn predict(
    State(app): State<AppState>,
    State(config): State<Arc<Config>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<BTreeMap<String, Vec<ForecastPoint>>>, ApiError> {
    let date = req.validate(config.forecast.max_topics_per_request)?;
    let start = date.and_time(NaiveTime::MIN);
    let end = start + Days::new(1);

    let topics = req.topics;
    let rows = app.pipeline.with_cache(move |cache| cache.select(&topics, start, end)).await?;
    let points = rows
        .into_iter()
        .map(|(topic, rows)| (topic, rows.iter().map(ForecastPoint::cached).collect()))
        .collect();
    Ok(Json(points))
}

/// GET /api/forecasts/available
/// Summary of cached points
///
/// Row count, distinct topics and distinct dates, optionally narrowed to one topic
/// and a `[date_from, date_to)` window.
#[utoipa::path(
    get,
    path = "/api/forecasts/available",
    params(AvailableQuery),
    responses(
        (status = 200, description = "Cache summary", body = AvailableSummary),
        (status = 400, description = "Bad date or inverted range"),
        (status = 503, description = "Forecast cache unavailable")
    )
)]
pub async fn available(
    State(app): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<AvailableSummary>, ApiError> {
    let filter = AvailableFilter {
        topic: query.topic.filter(|t| !t.is_empty()),
        date_from: parse_optional_date("date_from", query.date_from.as_deref())?,
        date_to: parse_optional_date("date_to", query.date_to.as_deref())?,
    };
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to)
        && from >= to
    {
        return Err(ValidationError::InvertedRange.into());
    }
    Ok(Json(app.pipeline.with_cache(move |cache| cache.available_summary(&filter)).await?))
}

/// POST /api/forecasts/compute
/// Compute one topic-day
///
/// Resolves weather, evaluates clear-sky irradiance and production for all 96
/// slots and, with `write = true`, stores the points in the cache.
#[utoipa::path(
    post,
    path = "/api/forecasts/compute",
    request_body = ComputeRequest,
    responses(
        (status = 200, description = "Computed forecast", body = ForecastResult),
        (status = 400, description = "Bad date or weather source"),
        (status = 404, description = "Topic not found"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn compute(
    State(app): State<AppState>,
    Json(req): Json<ComputeRequest>,
) -> Result<Json<ForecastResult>, ApiError> {
    let date = parse_date("date", &req.date)?;
    let policy = SourcePolicy::parse(req.weather_source.as_deref().unwrap_or_default())?;
    let result = app.pipeline.compute_forecast(&req.topic, date, policy, req.write).await?;
    Ok(Json(result))
}

/// GET /api/weather/{topic}
/// Resolved weather for one topic-day
#[utoipa::path(
    get,
    path = "/api/weather/{topic}",
    params(
        ("topic" = String, Path, description = "Topic tag"),
        WeatherQuery
    ),
    responses(
        (status = 200, description = "Weather on the 15-minute grid", body = WeatherFetch),
        (status = 400, description = "Bad date or weather source"),
        (status = 404, description = "Topic not found")
    )
)]
pub async fn weather(
    State(app): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherFetch>, ApiError> {
    let date = parse_date("date", &query.date)?;
    let policy = SourcePolicy::parse(query.source.as_deref().unwrap_or_default())?;
    Ok(Json(app.pipeline.get_weather(&topic, date, policy).await?))
}
