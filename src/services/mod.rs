pub mod blocking;
pub mod clock;
pub mod correction_model;
pub mod forecast_cache;
pub mod forecast_pipeline;
pub mod history_jobs;
pub mod production_service;
pub mod resample;
pub mod solar_algorithm;
pub mod topic_store;
pub mod weather_api;
pub mod weather_archive;
pub mod weather_service;
