use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::topic::TopicSpec;

fn default_port() -> u16 { 8080 }
fn default_forecast_db() -> String { "data/forecast.db".to_string() }
fn default_archive_db() -> String { "data/archive.db".to_string() }
fn default_api_url() -> String { "http://api.weatherapi.com/v1/forecast.json".to_string() }
fn default_timeout_s() -> u64 { 10 }
fn default_timezone() -> String { "Europe/Nicosia".to_string() }
fn default_days_ahead() -> u32 { 2 }
fn default_refresh_hours() -> u64 { 6 }
fn default_history_days() -> u32 { 30 }
fn default_max_history_days() -> u32 { 365 }
fn default_batch_size() -> usize { 5000 }
fn default_max_topics() -> usize { 50 }
fn default_true() -> bool { true }
fn default_model_dir() -> String { "models".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub weather_api: WeatherApiConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub models: ModelConfig,
    /// Static topic list, used when `storage.spec_db` is not set.
    #[serde(default)]
    pub topics: Vec<TopicSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_forecast_db")]
    pub forecast_db: String,
    #[serde(default = "default_archive_db")]
    pub archive_db: String,
    pub spec_db: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            forecast_db: default_forecast_db(),
            archive_db: default_archive_db(),
            spec_db: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-call budget; a slower call counts as a miss from the live source.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            api_key: String::new(),
            timeout_s: default_timeout_s(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    #[serde(default = "default_refresh_hours")]
    pub refresh_hours: u64,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    #[serde(default = "default_max_history_days")]
    pub max_history_days: u32,
    #[serde(default = "default_batch_size")]
    pub history_batch_size: usize,
    #[serde(default = "default_max_topics")]
    pub max_topics_per_request: usize,
    #[serde(default = "default_true")]
    pub precompute_enabled: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            days_ahead: default_days_ahead(),
            refresh_hours: default_refresh_hours(),
            history_days: default_history_days(),
            max_history_days: default_max_history_days(),
            history_batch_size: default_batch_size(),
            max_topics_per_request: default_max_topics(),
            precompute_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub dir: String,
    /// Artifact used for topics that have no model of their own.
    pub fallback: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { dir: default_model_dir(), fallback: None }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let mut config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        if let Ok(key) = std::env::var("WEATHER_API_KEY")
            && !key.is_empty()
        {
            config.weather_api.api_key = key;
        }
        config.timezone()?;
        Ok(config)
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.forecast
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::Timezone(self.forecast.timezone.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{ "server": {{ "port": 9000 }} }}"#).unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.weather_api.timeout_s, 10);
        assert_eq!(cfg.forecast.history_batch_size, 5000);
        assert_eq!(cfg.timezone().unwrap(), chrono_tz::Europe::Nicosia);
        assert!(cfg.topics.is_empty());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "forecast": { "timezone": "Mars/Olympus" } }"#).unwrap();

        let err = Config::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Timezone(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load("/nonexistent/pv-forecast.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
