use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// ─── Caller input ────────────────────────────────────────────────────────────

/// Rejected request input. Raised before any computation starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field}: expected YYYY-MM-DD, got {value:?}")]
    BadDate { field: &'static str, value: String },

    #[error("unknown weather source {0:?}: expected auto, archive_db or weather_api")]
    BadSource(String),

    #[error("topics list is empty")]
    NoTopics,

    #[error("topics limit exceeded: {limit}")]
    TooManyTopics { limit: usize },

    #[error("days must be a positive number")]
    NonPositiveDays,

    #[error("date_from must be earlier than date_to")]
    InvertedRange,

    #[error("limit must be between 1 and {max}")]
    LimitOutOfRange { max: usize },
}

// ─── Persistence ─────────────────────────────────────────────────────────────

/// Failure to reach or query a persisted store (topic specs, forecast cache).
///
/// Kept separate from "no rows" so callers can tell an empty result from an
/// unavailable service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no partition covers {ts}; call ensure_partitions first")]
    MissingPartition { ts: String },

    #[error("store lock poisoned")]
    Poisoned,

    /// The blocking task running the query died.
    #[error("{0}")]
    Worker(String),
}

// ─── Upstream weather ────────────────────────────────────────────────────────

/// One failed weather fetch. Never fatal: the resolver records it as a
/// diagnostic and moves on to the other source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage}: {message}")]
pub struct FetchError {
    pub stage: &'static str,
    pub message: String,
}

impl FetchError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self { stage, message: message.into() }
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("cannot parse {path}: {source}")]
    Parse { path: String, source: serde_json::Error },

    #[error("unknown timezone {0:?}")]
    Timezone(String),
}

// ─── Forecast computation ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── HTTP boundary ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("database is unavailable, try again later")]
    Unavailable(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Unavailable(err)
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::TopicNotFound(topic) => ApiError::NotFound(format!("topic not found: {topic}")),
            ForecastError::Store(e) => ApiError::Unavailable(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(e) => {
                tracing::error!("store unavailable: {e}");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_map_to_503() {
        let err: ApiError = StoreError::Poisoned.into();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unknown_topic_maps_to_404() {
        let err: ApiError = ForecastError::TopicNotFound("T1".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400_with_message() {
        let err: ApiError = ValidationError::TooManyTopics { limit: 3 }.into();
        assert_eq!(err.to_string(), "topics limit exceeded: 3");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
