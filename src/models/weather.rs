use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{FetchError, ValidationError};
use crate::serialize_minute;

// ─── Sources ─────────────────────────────────────────────────────────────────

/// The two upstream weather providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WeatherSource {
    #[serde(rename = "archive_db")]
    Archive,
    #[serde(rename = "weather_api")]
    LiveApi,
}

impl WeatherSource {
    pub fn as_str(self) -> &'static str {
        match self {
            WeatherSource::Archive => "archive_db",
            WeatherSource::LiveApi => "weather_api",
        }
    }

    pub fn other(self) -> Self {
        match self {
            WeatherSource::Archive => WeatherSource::LiveApi,
            WeatherSource::LiveApi => WeatherSource::Archive,
        }
    }
}

impl fmt::Display for WeatherSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the resolver picks sources for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Past dates: archive then live API. Today and later: live API then archive.
    Auto,
    /// Only the named source, no fallback.
    Forced(WeatherSource),
}

impl SourcePolicy {
    /// Parses the `weather_source` request field.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "" | "auto" => Ok(SourcePolicy::Auto),
            "archive_db" => Ok(SourcePolicy::Forced(WeatherSource::Archive)),
            "weather_api" => Ok(SourcePolicy::Forced(WeatherSource::LiveApi)),
            other => Err(ValidationError::BadSource(other.to_string())),
        }
    }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A weather observation as returned by a provider, before resampling.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWeatherRecord {
    pub time: NaiveDateTime,
    pub temp_c: Option<f64>,
    pub cloud: Option<f64>,
}

impl RawWeatherRecord {
    pub fn is_usable(&self) -> bool {
        self.temp_c.is_some() || self.cloud.is_some()
    }
}

/// One point of the 15-minute weather grid.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WeatherRecord {
    #[serde(with = "serialize_minute")]
    #[schema(value_type = String, example = "2024-01-01 06:15")]
    pub time: NaiveDateTime,
    /// Ambient temperature (°C)
    pub temp_c: Option<f64>,
    /// Cloud cover (0-100)
    pub cloud: Option<i32>,
}

// ─── Resolver output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    NoData,
}

/// Result of weather resolution. `source` is `None` only with `NoData`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeatherFetch {
    pub records: Vec<WeatherRecord>,
    #[serde(serialize_with = "serialize_source")]
    #[schema(value_type = String, example = "archive_db")]
    pub source: Option<WeatherSource>,
    pub status: FetchStatus,
    /// Flat `<source>_<key>` map: records, non_null_points, stage, error.
    pub diagnostics: BTreeMap<String, String>,
}

fn serialize_source<S: serde::Serializer>(source: &Option<WeatherSource>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(source.map_or("none", WeatherSource::as_str))
}

impl WeatherFetch {
    pub fn source_name(&self) -> &'static str {
        self.source.map_or("none", WeatherSource::as_str)
    }
}

// ─── weatherapi.com wire types ────────────────────────────────────────────────
// Shared by the live API client and the JSON archive decoder.

#[derive(Debug, Deserialize)]
pub struct ForecastDocument {
    pub forecast: ForecastBody,
}

#[derive(Debug, Deserialize)]
pub struct ForecastBody {
    pub forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastDay {
    #[serde(default)]
    pub hour: Vec<HourItem>,
}

#[derive(Debug, Deserialize)]
pub struct HourItem {
    /// Local time, "YYYY-MM-DD HH:MM"
    pub time: String,
    pub temp_c: Option<f64>,
    pub cloud: Option<f64>,
}

impl ForecastDocument {
    /// Flattens every hour of every day. Fails with `stage` on a bad time string.
    pub fn into_records(self, stage: &'static str) -> Result<Vec<RawWeatherRecord>, FetchError> {
        self.forecast
            .forecastday
            .into_iter()
            .flat_map(|day| day.hour)
            .map(|h| {
                let time = serialize_minute::parse(&h.time)
                    .map_err(|e| FetchError::new(stage, format!("bad hour time {:?}: {e}", h.time)))?;
                Ok(RawWeatherRecord { time, temp_c: h.temp_c, cloud: h.cloud })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("", SourcePolicy::Auto)]
    #[case::auto("auto", SourcePolicy::Auto)]
    #[case::archive("archive_db", SourcePolicy::Forced(WeatherSource::Archive))]
    #[case::live("weather_api", SourcePolicy::Forced(WeatherSource::LiveApi))]
    fn parses_policy(#[case] raw: &str, #[case] expected: SourcePolicy) {
        assert_eq!(SourcePolicy::parse(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert_eq!(
            SourcePolicy::parse("satellite"),
            Err(ValidationError::BadSource("satellite".to_string()))
        );
    }

    #[test]
    fn no_data_serializes_source_as_none() {
        let fetch = WeatherFetch {
            records: vec![],
            source: None,
            status: FetchStatus::NoData,
            diagnostics: BTreeMap::new(),
        };
        let json = serde_json::to_value(&fetch).unwrap();
        assert_eq!(json["source"], "none");
        assert_eq!(json["status"], "no_data");
    }

    #[test]
    fn document_flattens_all_days() {
        let doc: ForecastDocument = serde_json::from_str(
            r#"{"forecast":{"forecastday":[
                {"hour":[{"time":"2024-01-01 06:00","temp_c":10.0,"cloud":50}]},
                {"hour":[{"time":"2024-01-02 06:00","temp_c":null,"cloud":null}]}
            ]}}"#,
        )
        .unwrap();
        let records = doc.into_records("payload_decode").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_usable());
        assert!(!records[1].is_usable());
    }

    #[test]
    fn document_reports_bad_time_with_stage() {
        let doc: ForecastDocument =
            serde_json::from_str(r#"{"forecast":{"forecastday":[{"hour":[{"time":"06:00","temp_c":1.0}]}]}}"#).unwrap();
        let err = doc.into_records("timeseries_parse").unwrap_err();
        assert_eq!(err.stage, "timeseries_parse");
    }
}
