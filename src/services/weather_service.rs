//! Weather source resolution.
//!
//! Picks the archive or the live API for one topic-day, falls back to the
//! other source on a miss and resamples the winner onto the 15-minute grid.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::FetchError;
use crate::models::topic::TopicSpec;
use crate::models::weather::{FetchStatus, RawWeatherRecord, SourcePolicy, WeatherFetch, WeatherSource};
use crate::services::clock::Clock;
use crate::services::resample;
use crate::services::weather_api::LiveWeatherProvider;
use crate::services::weather_archive::ArchiveWeatherProvider;

/// Keys needed to query either source. Missing keys turn that source into a miss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherTarget {
    pub object_id: Option<i64>,
    pub coordinates: Option<(f64, f64)>,
}

impl From<&TopicSpec> for WeatherTarget {
    fn from(spec: &TopicSpec) -> Self {
        Self { object_id: spec.user_object_id, coordinates: spec.coordinates() }
    }
}

pub struct WeatherResolver {
    archive: Arc<dyn ArchiveWeatherProvider>,
    live: Arc<dyn LiveWeatherProvider>,
    clock: Arc<dyn Clock>,
}

impl WeatherResolver {
    pub fn new(archive: Arc<dyn ArchiveWeatherProvider>, live: Arc<dyn LiveWeatherProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { archive, live, clock }
    }

    /// Ordered list of sources to try for `date`.
    pub fn source_order(&self, date: NaiveDate, policy: SourcePolicy) -> Vec<WeatherSource> {
        match policy {
            SourcePolicy::Forced(source) => vec![source],
            SourcePolicy::Auto => {
                let primary = if date < self.clock.today() { WeatherSource::Archive } else { WeatherSource::LiveApi };
                vec![primary, primary.other()]
            }
        }
    }

    /// Never fails: every upstream problem ends up in `diagnostics`, and a
    /// double miss is reported as `NoData`.
    pub async fn resolve(&self, target: WeatherTarget, date: NaiveDate, policy: SourcePolicy) -> WeatherFetch {
        let mut diagnostics = BTreeMap::new();

        for source in self.source_order(date, policy) {
            let raw = match self.fetch_from(source, target, date).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(source = source.as_str(), stage = e.stage, "weather fetch failed: {}", e.message);
                    record_failure(&mut diagnostics, source, &e);
                    continue;
                }
            };

            let returned = raw.len();
            let on_day: Vec<RawWeatherRecord> = raw.into_iter().filter(|r| r.time.date() == date).collect();
            if on_day.is_empty() {
                if returned > 0 {
                    let e = FetchError::new("no_records_for_date", format!("{returned} records returned, none on {date}"));
                    tracing::warn!(source = source.as_str(), "weather records belong to other dates");
                    diagnostics.insert(format!("{source}_records"), "0".to_string());
                    record_failure(&mut diagnostics, source, &e);
                }
                continue;
            }

            let non_null = on_day.iter().filter(|r| r.is_usable()).count();
            diagnostics.insert(format!("{source}_records"), on_day.len().to_string());
            diagnostics.insert(format!("{source}_non_null_points"), non_null.to_string());

            if non_null == 0 {
                let e = FetchError::new("empty_weather_values", "records are present, but temp_c/cloud are null for all points");
                tracing::warn!(source = source.as_str(), "weather records carry no values");
                record_failure(&mut diagnostics, source, &e);
                continue;
            }

            return WeatherFetch {
                records: resample::normalize_day(&on_day, date),
                source: Some(source),
                status: FetchStatus::Ok,
                diagnostics,
            };
        }

        WeatherFetch { records: Vec::new(), source: None, status: FetchStatus::NoData, diagnostics }
    }

    async fn fetch_from(&self, source: WeatherSource, target: WeatherTarget, date: NaiveDate) -> Result<Vec<RawWeatherRecord>, FetchError> {
        match source {
            WeatherSource::Archive => {
                let object_id = target
                    .object_id
                    .ok_or_else(|| FetchError::new("missing_object_id", "topic has no user_object_id"))?;
                self.archive.fetch(object_id, date).await
            }
            WeatherSource::LiveApi => {
                let (lat, lon) = target
                    .coordinates
                    .ok_or_else(|| FetchError::new("missing_coordinates", "topic has no latitude/longitude"))?;
                self.live.fetch(lat, lon, date).await
            }
        }
    }
}

fn record_failure(diagnostics: &mut BTreeMap<String, String>, source: WeatherSource, err: &FetchError) {
    diagnostics.insert(format!("{source}_stage"), err.stage.to_string());
    diagnostics.insert(format!("{source}_error"), err.message.clone());
}
