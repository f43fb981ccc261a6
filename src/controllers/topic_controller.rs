use axum::{
    Json,
    extract::{Query, State},
};

use crate::error::ApiError;
use crate::models::requests::TopicsQuery;
use crate::models::topic::TopicSpec;
use crate::shared_state::AppState;

const DEFAULT_LIMIT: usize = 200;

async fn list_specs(app: &AppState, query: TopicsQuery) -> Result<Vec<TopicSpec>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let like = query.like;
    Ok(app.pipeline.with_topics(move |topics| topics.list(like.as_deref(), limit)).await?)
}

/// GET /api/topics
/// List topic tags
#[utoipa::path(
    get,
    path = "/api/topics",
    params(TopicsQuery),
    responses(
        (status = 200, description = "Topic tags ordered by tag", body = Vec<String>),
        (status = 503, description = "Topic store unavailable")
    )
)]
pub async fn list_topics(
    State(app): State<AppState>,
    Query(query): Query<TopicsQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let specs = list_specs(&app, query).await?;
    Ok(Json(specs.into_iter().map(|s| s.tag).collect()))
}

/// GET /api/topics/specs
/// List full topic specifications
///
/// Same filter as `/api/topics`, returning every spec field.
#[utoipa::path(
    get,
    path = "/api/topics/specs",
    params(TopicsQuery),
    responses(
        (status = 200, description = "Topic specifications", body = Vec<TopicSpec>),
        (status = 503, description = "Topic store unavailable")
    )
)]
pub async fn list_topic_specs(
    State(app): State<AppState>,
    Query(query): Query<TopicsQuery>,
) -> Result<Json<Vec<TopicSpec>>, ApiError> {
    let specs = list_specs(&app, query).await?;
    Ok(Json(specs))
}
