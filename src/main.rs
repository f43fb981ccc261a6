mod routes;
mod controllers;
mod services;
mod models;
mod api_docs;
mod shared_state;
mod config;
mod error;
mod serialize_minute;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get, response::Html};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use crate::api_docs::ApiDoc;
use crate::config::Config;
use crate::routes::forecast_routes::app_routes;
use crate::services::clock::{Clock, SystemClock};
use crate::services::correction_model::JsonModelLoader;
use crate::services::forecast_cache::{ForecastCache, SqliteForecastCache};
use crate::services::forecast_pipeline::ForecastPipeline;
use crate::services::history_jobs::HistoryJobService;
use crate::services::topic_store::{SqliteTopicStore, StaticTopicStore, TopicStore};
use crate::services::weather_api::WeatherApiClient;
use crate::services::weather_archive::{JsonArchiveDecoder, SqliteArchiveStore};
use crate::services::weather_service::WeatherResolver;
use crate::shared_state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("pv-forecast stopped: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config_path = std::env::var("PV_FORECAST_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::load(&config_path)?;
    let tz = config.timezone()?;
    tracing::info!("configuration loaded from {config_path}: timezone {tz}");

    // 2. Stores and upstream clients
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let topics: Arc<dyn TopicStore> = match &config.storage.spec_db {
        Some(path) => Arc::new(SqliteTopicStore::open(path)?),
        None => Arc::new(StaticTopicStore::new(config.topics.clone())),
    };
    let cache = Arc::new(SqliteForecastCache::open(&config.storage.forecast_db)?);
    cache.migrate()?;
    let archive = Arc::new(SqliteArchiveStore::open(&config.storage.archive_db, Arc::new(JsonArchiveDecoder))?);
    let live = Arc::new(WeatherApiClient::new(&config.weather_api)?);
    if config.weather_api.api_key.is_empty() {
        tracing::warn!("weather_api.api_key is empty; live forecasts will fail");
    }

    // 3. Forecast core
    let resolver = Arc::new(WeatherResolver::new(archive, live, clock.clone()));
    let pipeline = Arc::new(ForecastPipeline::new(
        topics,
        resolver,
        Arc::new(JsonModelLoader::new(&config.models)),
        cache,
        clock.clone(),
        tz,
        config.forecast.days_ahead,
    ));
    let jobs = Arc::new(HistoryJobService::new(
        pipeline.clone(),
        clock,
        config.forecast.history_batch_size,
        config.forecast.max_history_days,
    ));

    // 4. Future forecast refresh
    if config.forecast.precompute_enabled {
        let pipeline = pipeline.clone();
        let period = Duration::from_secs(config.forecast.refresh_hours.max(1) * 3600);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match pipeline.precompute_future().await {
                    Ok(written) => tracing::info!("[PRECOMPUTE] {written} points refreshed"),
                    Err(e) => tracing::error!("[PRECOMPUTE] failed: {e}"),
                }
            }
        });
    }

    // 5. Start Axum HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let shared = SharedState { app: AppState::new(pipeline, jobs), config: Arc::new(config) };
    let app = Router::new()
        .merge(app_routes(shared))
        .route("/scalar", get(|| async {
            Html(Scalar::new(ApiDoc::openapi()).to_html())
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API Server listening on http://{addr}");
    tracing::info!("Scalar UI: http://{addr}/scalar");

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
