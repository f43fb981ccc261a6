use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::weather::FetchStatus;
use crate::serialize_minute;

/// Source tag stored with points read back from the cache.
pub const SOURCE_CACHE: &str = "cache";

/// A computed power value for one topic at one 15-minute slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub topic: String,
    pub ts: NaiveDateTime,
    /// Watts; `None` when the estimate was not a finite number.
    pub power: Option<f64>,
    pub source: String,
}

/// Wire shape of a forecast point: `{ "x": "YYYY-MM-DD HH:MM", "y": <float|null>, "source": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastPoint {
    #[serde(with = "serialize_minute")]
    #[schema(value_type = String, example = "2024-01-01 12:00")]
    pub x: NaiveDateTime,
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ForecastPoint {
    /// A point served from the cache, tagged with [`SOURCE_CACHE`].
    pub fn cached(row: &ForecastRow) -> Self {
        Self { x: row.ts, y: row.power, source: Some(SOURCE_CACHE.to_string()) }
    }
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct Timings {
    pub spec: u64,
    pub weather: u64,
    pub irradiance: u64,
    pub model: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ForecastMeta {
    pub used_model: String,
    pub timings_ms: Timings,
    pub warnings: Vec<String>,
    pub cache_written: bool,
}

/// Result of the direct compute path for one topic and day.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ForecastResult {
    pub topic: String,
    pub date: String,
    pub weather_source_used: String,
    pub status: FetchStatus,
    pub diagnostics: BTreeMap<String, String>,
    pub points: Vec<ForecastPoint>,
    pub meta: ForecastMeta,
}

// ─── Cache reporting ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AvailableSummary {
    pub count: u64,
    pub topics: Vec<String>,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CacheStats {
    pub points_count: u64,
    pub topics_count: u64,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct Coverage {
    pub count: u64,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
}

/// Per-topic row count and time span across the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct TopicSample {
    pub topic: String,
    pub points_count: u64,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TopicSamples {
    pub items: Vec<TopicSample>,
}

/// Cached points of one topic-day, capped by the request limit.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheSelection {
    pub topic: String,
    pub date: String,
    pub count: usize,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
    pub points: Vec<ForecastPoint>,
}

impl CacheSelection {
    pub fn new(topic: String, date: String, rows: &[ForecastRow]) -> Self {
        let stamp = |row: &ForecastRow| row.ts.format(serialize_minute::FORMAT).to_string();
        Self {
            topic,
            date,
            count: rows.len(),
            min_ts: rows.first().map(stamp),
            max_ts: rows.last().map(stamp),
            points: rows.iter().map(|r| ForecastPoint { x: r.ts, y: r.power, source: None }).collect(),
        }
    }
}

// ─── Topic-list generation ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeneratedTopic {
    pub topic: String,
    pub points: usize,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TopicFailure {
    pub topic: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct GenerateReport {
    pub generated: Vec<GeneratedTopic>,
    /// Points written to the cache; zero when `write` was off.
    pub written: usize,
    pub errors: Vec<TopicFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_power_serializes_as_null() {
        let p = ForecastPoint {
            x: crate::serialize_minute::parse("2024-01-01 12:00").unwrap(),
            y: None,
            source: None,
        };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"x":"2024-01-01 12:00","y":null}"#);
    }

    #[test]
    fn selection_reports_span_of_returned_points() {
        let at = |h: u32| crate::serialize_minute::parse(&format!("2024-01-01 {h:02}:00")).unwrap();
        let rows: Vec<ForecastRow> = [6, 7]
            .into_iter()
            .map(|h| ForecastRow { topic: "T1".into(), ts: at(h), power: Some(1.0), source: SOURCE_CACHE.into() })
            .collect();

        let sel = CacheSelection::new("T1".into(), "2024-01-01".into(), &rows);
        assert_eq!(sel.count, 2);
        assert_eq!(sel.min_ts.as_deref(), Some("2024-01-01 06:00"));
        assert_eq!(sel.max_ts.as_deref(), Some("2024-01-01 07:00"));

        let empty = CacheSelection::new("T1".into(), "2024-01-01".into(), &[]);
        assert_eq!((empty.count, empty.min_ts), (0, None));
    }
}
