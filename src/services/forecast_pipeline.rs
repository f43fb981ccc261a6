/// ============================================================
///  Forecast Pipeline
///
///  compute_forecast(topic, date):
///   1. Topic spec      – from the TopicStore (unknown -> not found)
///   2. Weather         – WeatherResolver, 96 slots on the day grid
///   3. Irradiance      – clear-sky POA per slot
///   4. Production      – correction model + system production
///   5. Cache write     – optional, partitions ensured first
///
///  precompute_future() refreshes today .. today + days_ahead
///  for every topic after dropping all cached rows from today on.
/// ============================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::error::{ForecastError, StoreError};
use crate::models::forecast::{
    ForecastMeta, ForecastPoint, ForecastResult, ForecastRow, GenerateReport, GeneratedTopic, TopicFailure, Timings,
};
use crate::models::topic::TopicSpec;
use crate::models::weather::{FetchStatus, SourcePolicy, WeatherFetch};
use crate::services::blocking::blocking;
use crate::services::clock::Clock;
use crate::services::correction_model::{LoadedModel, ModelLoader, NO_MODEL};
use crate::services::forecast_cache::ForecastCache;
use crate::services::production_service;
use crate::services::solar_algorithm;
use crate::services::topic_store::TopicStore;
use crate::services::weather_service::{WeatherResolver, WeatherTarget};

/// Rows for one topic-day plus the time spent in each stage.
pub struct DayEstimate {
    pub rows: Vec<ForecastRow>,
    pub irradiance: Duration,
    pub model: Duration,
}

pub struct ForecastPipeline {
    topics: Arc<dyn TopicStore>,
    resolver: Arc<WeatherResolver>,
    models: Arc<dyn ModelLoader>,
    cache: Arc<dyn ForecastCache>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    days_ahead: u32,
}

impl ForecastPipeline {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        resolver: Arc<WeatherResolver>,
        models: Arc<dyn ModelLoader>,
        cache: Arc<dyn ForecastCache>,
        clock: Arc<dyn Clock>,
        tz: Tz,
        days_ahead: u32,
    ) -> Self {
        Self { topics, resolver, models, cache, clock, tz, days_ahead }
    }

    /// Runs `work` against the topic store on the blocking pool.
    pub async fn with_topics<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn TopicStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let topics = Arc::clone(&self.topics);
        blocking(move || work(topics.as_ref())).await
    }

    /// Runs `work` against the forecast cache on the blocking pool.
    pub async fn with_cache<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn ForecastCache) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        blocking(move || work(cache.as_ref())).await
    }

    pub async fn require_topic(&self, tag: &str) -> Result<TopicSpec, ForecastError> {
        let key = tag.to_string();
        self.with_topics(move |topics| topics.get(&key))
            .await?
            .ok_or_else(|| ForecastError::TopicNotFound(tag.to_string()))
    }

    pub async fn resolve_weather(&self, spec: &TopicSpec, date: NaiveDate, policy: SourcePolicy) -> WeatherFetch {
        self.resolver.resolve(WeatherTarget::from(spec), date, policy).await
    }

    /// Resolved weather on the 15-minute grid for one topic-day.
    pub async fn get_weather(&self, tag: &str, date: NaiveDate, policy: SourcePolicy) -> Result<WeatherFetch, ForecastError> {
        let spec = self.require_topic(tag).await?;
        Ok(self.resolve_weather(&spec, date, policy).await)
    }

    /// Model artifacts are read from disk, so loading goes through the blocking pool.
    pub async fn load_model(&self, spec: &TopicSpec) -> Result<Option<LoadedModel>, StoreError> {
        let (models, spec) = (Arc::clone(&self.models), spec.clone());
        blocking(move || Ok(models.load(&spec))).await
    }

    /// Irradiance and power for every weather slot, computed on the blocking pool.
    pub async fn estimate_day(
        &self,
        spec: &TopicSpec,
        weather: &WeatherFetch,
        model: Option<&LoadedModel>,
    ) -> Result<DayEstimate, StoreError> {
        let (spec, weather, model, tz) = (spec.clone(), weather.clone(), model.cloned(), self.tz);
        blocking(move || Ok(estimate_rows(&spec, &weather, model.as_ref(), tz))).await
    }

    /// Writes rows after making sure their months are partitioned.
    pub async fn write_rows(&self, rows: Vec<ForecastRow>) -> Result<usize, StoreError> {
        self.with_cache(move |cache| store_rows(cache, &rows)).await
    }

    pub async fn compute_forecast(
        &self,
        tag: &str,
        date: NaiveDate,
        policy: SourcePolicy,
        write: bool,
    ) -> Result<ForecastResult, ForecastError> {
        let started = Instant::now();
        let spec = self.require_topic(tag).await?;
        let spec_ms = started.elapsed();

        let t = Instant::now();
        let weather = self.resolve_weather(&spec, date, policy).await;
        let weather_ms = t.elapsed();

        let model = self.load_model(&spec).await?;
        let day = self.estimate_day(&spec, &weather, model.as_ref()).await?;
        let points = day.rows.iter().map(|r| ForecastPoint { x: r.ts, y: r.power, source: None }).collect();

        let cache_written = if write && weather.status == FetchStatus::Ok && !day.rows.is_empty() {
            self.write_rows(day.rows).await?;
            true
        } else {
            false
        };

        Ok(ForecastResult {
            topic: spec.tag.clone(),
            date: date.format("%Y-%m-%d").to_string(),
            weather_source_used: weather.source_name().to_string(),
            status: weather.status,
            points,
            diagnostics: weather.diagnostics,
            meta: ForecastMeta {
                used_model: model.map_or_else(|| NO_MODEL.to_string(), |m| m.name),
                timings_ms: Timings {
                    spec: millis(spec_ms),
                    weather: millis(weather_ms),
                    irradiance: millis(day.irradiance),
                    model: millis(day.model),
                    total: millis(started.elapsed()),
                },
                warnings: spec.warnings(),
                cache_written,
            },
        })
    }

    /// Computes a list of topics for one date and reports each outcome.
    /// Unknown topics and store failures land in `errors`; the rest are
    /// written when `write` is set.
    pub async fn generate(&self, topics: &[String], date: NaiveDate, policy: SourcePolicy, write: bool) -> GenerateReport {
        let mut report = GenerateReport::default();
        for tag in topics {
            match self.compute_forecast(tag, date, policy, write).await {
                Ok(result) if result.status == FetchStatus::Ok => {
                    if result.meta.cache_written {
                        report.written += result.points.len();
                    }
                    report.generated.push(GeneratedTopic {
                        topic: result.topic,
                        points: result.points.len(),
                        source: result.weather_source_used,
                    });
                }
                Ok(result) => report.errors.push(TopicFailure {
                    topic: tag.clone(),
                    error: format!("no weather data ({:?})", result.diagnostics),
                }),
                Err(e) => report.errors.push(TopicFailure { topic: tag.clone(), error: e.to_string() }),
            }
        }
        report
    }

    /// Drops cached rows from today on and recomputes the forward window for every topic.
    /// Returns the number of points written.
    pub async fn precompute_future(&self) -> Result<usize, StoreError> {
        let today = self.clock.today();
        let removed = self.with_cache(move |cache| cache.delete_from(today.and_time(NaiveTime::MIN))).await?;
        tracing::info!("precompute: removed {removed} future points from {today}");

        let specs = self.with_topics(|topics| topics.list(None, usize::MAX)).await?;
        let mut written = 0;
        for offset in 0..=u64::from(self.days_ahead) {
            let Some(date) = today.checked_add_days(Days::new(offset)) else { break };
            for spec in &specs {
                match self.compute_forecast(&spec.tag, date, SourcePolicy::Auto, true).await {
                    Ok(result) if result.meta.cache_written => written += result.points.len(),
                    Ok(result) => tracing::warn!(topic = %spec.tag, %date, "precompute: no weather ({:?})", result.diagnostics),
                    Err(e) => tracing::warn!(topic = %spec.tag, %date, "precompute failed: {e}"),
                }
            }
        }
        tracing::info!("precompute: wrote {written} points for {} topics", specs.len());
        Ok(written)
    }
}

fn estimate_rows(spec: &TopicSpec, weather: &WeatherFetch, model: Option<&LoadedModel>, tz: Tz) -> DayEstimate {
    let (lat, lon) = spec.coordinates().unwrap_or((0.0, 0.0));
    let source = weather.source_name().to_string();
    let mut out = DayEstimate { rows: Vec::with_capacity(weather.records.len()), irradiance: Duration::ZERO, model: Duration::ZERO };

    for rec in &weather.records {
        let t = Instant::now();
        let irr = solar_algorithm::clear_sky_irradiance(lat, lon, rec.time, spec.tilt, spec.azimuth, tz);
        out.irradiance += t.elapsed();

        let t = Instant::now();
        let power = production_service::estimate(irr, rec, spec, model.map(|m| m.model.as_ref()));
        out.model += t.elapsed();

        out.rows.push(ForecastRow { topic: spec.tag.clone(), ts: rec.time, power, source: source.clone() });
    }
    out
}

fn store_rows(cache: &dyn ForecastCache, rows: &[ForecastRow]) -> Result<usize, StoreError> {
    let (Some(first), Some(last)) = (rows.iter().map(|r| r.ts).min(), rows.iter().map(|r| r.ts).max()) else {
        return Ok(0);
    };
    cache.ensure_partitions(first, last)?;
    cache.upsert(rows)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
