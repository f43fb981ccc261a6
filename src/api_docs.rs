use utoipa::OpenApi;

use crate::controllers::{admin_controller, forecast_controller, job_controller, topic_controller};
use crate::models::{forecast, job, requests, topic, weather};

#[derive(OpenApi)]
#[openapi(
    paths(
        admin_controller::health,
        admin_controller::ready,
        topic_controller::list_topics,
        topic_controller::list_topic_specs,
        forecast_controller::predict,
        forecast_controller::available,
        forecast_controller::compute,
        forecast_controller::weather,
        job_controller::generate_history,
        job_controller::get_job,
        job_controller::generate_topics,
        admin_controller::cache_stats,
        admin_controller::cache_coverage,
        admin_controller::topic_samples,
        admin_controller::cache_select
    ),
    components(
        schemas(
            topic::TopicSpec,
            weather::WeatherRecord,
            weather::WeatherFetch,
            weather::FetchStatus,
            forecast::ForecastPoint,
            forecast::ForecastResult,
            forecast::ForecastMeta,
            forecast::Timings,
            forecast::AvailableSummary,
            forecast::CacheStats,
            forecast::Coverage,
            forecast::TopicSample,
            forecast::TopicSamples,
            forecast::CacheSelection,
            forecast::GeneratedTopic,
            forecast::TopicFailure,
            forecast::GenerateReport,
            job_controller::GenerateResponse,
            job::HistoryJob,
            job::JobState,
            job::JobCreation,
            requests::PredictRequest,
            requests::ComputeRequest,
            requests::HistoryRequest,
            requests::CacheSelectRequest,
            requests::GenerateRequest,
            requests::GenerateMode
        )
    ),
    tags(
        (name = "pv-forecast", description = "PV production forecast API")
    )
)]
pub struct ApiDoc;
