use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::forecast::GenerateReport;
use crate::models::job::{HistoryJob, JobCreation};
use crate::models::requests::{GenerateMode, GenerateRequest, HistoryRequest};
use crate::shared_state::AppState;

/// POST /api/jobs/generate-history
/// Start a history backfill
///
/// Only one backfill runs at a time. While one is queued or running, the call
/// returns that job with `started = false`. Progress is observed by polling
/// `GET /api/jobs/{id}`.
#[utoipa::path(
    post,
    path = "/api/jobs/generate-history",
    request_body = HistoryRequest,
    responses(
        (status = 202, description = "Job accepted (new or already active)", body = JobCreation),
        (status = 400, description = "Non-positive day count")
    )
)]
pub async fn generate_history(
    State(app): State<AppState>,
    State(config): State<Arc<Config>>,
    body: Option<Json<HistoryRequest>>,
) -> Result<(StatusCode, Json<JobCreation>), ApiError> {
    let days = body
        .and_then(|Json(req)| req.days)
        .unwrap_or(config.forecast.history_days);
    let creation = app.jobs.start(days)?;
    Ok((StatusCode::ACCEPTED, Json(creation)))
}

/// GET /api/jobs/{id}
/// Snapshot of a history job
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = HistoryJob),
        (status = 404, description = "Unknown job id")
    )
)]
pub async fn get_job(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryJob>, ApiError> {
    app.jobs
        .get_status(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {id}")))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub prediction_date: String,
    pub mode: GenerateMode,
    pub write: bool,
    #[serde(flatten)]
    pub report: GenerateReport,
}

/// POST /api/admin/jobs/generate
/// Compute a list of topics for one date
///
/// `future` reads the live API only, `history` the archive only. Topics that
/// fail are listed in `errors` and do not stop the others.
#[utoipa::path(
    post,
    path = "/api/admin/jobs/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Per-topic outcome", body = GenerateResponse),
        (status = 400, description = "Bad date or too many topics")
    )
)]
pub async fn generate_topics(
    State(app): State<AppState>,
    State(config): State<Arc<Config>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let date = req.validate(config.forecast.max_topics_per_request)?;
    let report = app.pipeline.generate(&req.topics, date, req.mode.policy(), req.write).await;
    tracing::info!(%date, generated = report.generated.len(), errors = report.errors.len(), "topic generation finished");
    Ok(Json(GenerateResponse { prediction_date: req.prediction_date, mode: req.mode, write: req.write, report }))
}
