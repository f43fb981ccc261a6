//! HTTP request bodies and query strings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ValidationError;
use crate::models::weather::{SourcePolicy, WeatherSource};

/// Upper bound of every `limit` on the admin cache endpoints.
pub const MAX_ADMIN_LIMIT: usize = 5000;

/// Parses a `YYYY-MM-DD` request field.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ValidationError::BadDate {
        field,
        value: raw.to_string(),
    })
}

/// Applies `default` when absent and rejects values outside `1..=MAX_ADMIN_LIMIT`.
pub fn admin_limit(raw: Option<usize>, default: usize) -> Result<usize, ValidationError> {
    match raw.unwrap_or(default) {
        n @ 1..=MAX_ADMIN_LIMIT => Ok(n),
        _ => Err(ValidationError::LimitOutOfRange { max: MAX_ADMIN_LIMIT }),
    }
}

/// Parses an optional date field; blank counts as absent.
pub fn parse_optional_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    raw.filter(|s| !s.trim().is_empty()).map(|s| parse_date(field, s)).transpose()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PredictRequest {
    /// `YYYY-MM-DD`
    pub prediction_date: String,
    pub topics: Vec<String>,
}

impl PredictRequest {
    pub fn validate(&self, max_topics: usize) -> Result<NaiveDate, ValidationError> {
        let date = parse_date("prediction_date", &self.prediction_date)?;
        if self.topics.is_empty() {
            return Err(ValidationError::NoTopics);
        }
        if self.topics.len() > max_topics {
            return Err(ValidationError::TooManyTopics { limit: max_topics });
        }
        Ok(date)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailableQuery {
    pub topic: Option<String>,
    /// Inclusive, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Exclusive, `YYYY-MM-DD`
    pub date_to: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ComputeRequest {
    pub topic: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `auto` (default), `archive_db` or `weather_api`
    #[serde(default)]
    pub weather_source: Option<String>,
    #[serde(default)]
    pub write: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WeatherQuery {
    /// `YYYY-MM-DD`
    pub date: String,
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct HistoryRequest {
    /// Days to backfill before today; defaults to the configured window
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CoverageQuery {
    pub topic: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopicsQuery {
    /// Case-insensitive substring of the tag
    pub like: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopicSamplesQuery {
    /// Topics to report, 1..=5000, default 50
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CacheSelectRequest {
    pub topic: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Points to return, 1..=5000, default 200
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Weather path of a topic-list generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerateMode {
    /// Live API only
    #[default]
    Future,
    /// Archive only
    History,
}

impl GenerateMode {
    pub fn policy(self) -> SourcePolicy {
        match self {
            GenerateMode::Future => SourcePolicy::Forced(WeatherSource::LiveApi),
            GenerateMode::History => SourcePolicy::Forced(WeatherSource::Archive),
        }
    }
}

fn default_true() -> bool { true }

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// `YYYY-MM-DD`
    pub prediction_date: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub mode: GenerateMode,
    #[serde(default = "default_true")]
    pub write: bool,
}

impl GenerateRequest {
    pub fn validate(&self, max_topics: usize) -> Result<NaiveDate, ValidationError> {
        let date = parse_date("prediction_date", &self.prediction_date)?;
        if self.topics.len() > max_topics {
            return Err(ValidationError::TooManyTopics { limit: max_topics });
        }
        Ok(date)
    }
}
