use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;

use crate::config::WeatherApiConfig;
use crate::error::FetchError;
use crate::models::weather::{ForecastDocument, RawWeatherRecord};

/// Live forecast source keyed by coordinates.
#[async_trait]
pub trait LiveWeatherProvider: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<Vec<RawWeatherRecord>, FetchError>;
}

/// weatherapi.com `forecast.json` client.
pub struct WeatherApiClient {
    client: Client,
    url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(cfg: &WeatherApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_s.max(1)))
            .build()?;
        Ok(Self { client, url: cfg.url.clone(), api_key: cfg.api_key.clone() })
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::new("timeout", format!("weather API did not answer in time: {e}"))
    } else if e.is_decode() {
        FetchError::new("payload_decode", format!("malformed weather API payload: {e}"))
    } else {
        FetchError::new("connect", format!("weather API request failed: {e}"))
    }
}

#[async_trait]
impl LiveWeatherProvider for WeatherApiClient {
    async fn fetch(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<Vec<RawWeatherRecord>, FetchError> {
        let query = format!("{lat},{lon}");
        let dt = date.format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(&self.url)
            .query(&[("key", self.api_key.as_str()), ("q", query.as_str()), ("dt", dt.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new("http_status", format!("weather API returned {status}")));
        }

        let doc: ForecastDocument = response.json().await.map_err(transport_error)?;
        doc.into_records("payload_decode")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::io::Write;

    fn client_for(server: &mockito::ServerGuard) -> WeatherApiClient {
        client_with_timeout(server, 5)
    }

    fn client_with_timeout(server: &mockito::ServerGuard, timeout_s: u64) -> WeatherApiClient {
        WeatherApiClient::new(&WeatherApiConfig {
            url: format!("{}/v1/forecast.json", server.url()),
            api_key: "k".to_string(),
            timeout_s,
        })
        .unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn parses_hourly_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "35,33".into()),
                Matcher::UrlEncoded("dt".into(), "2024-01-01".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"forecast":{"forecastday":[{"hour":[
                {"time":"2024-01-01 00:00","temp_c":8.5,"cloud":20},
                {"time":"2024-01-01 01:00","temp_c":8.1,"cloud":25}
            ]}]}}"#)
            .create_async()
            .await;

        let records = client_for(&server).fetch(35.0, 33.0, date()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].temp_c, Some(8.1));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let err = client_for(&server).fetch(35.0, 33.0, date()).await.unwrap_err();
        assert_eq!(err.stage, "http_status");
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":{"name":"Nicosia"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).fetch(35.0, 33.0, date()).await.unwrap_err();
        assert_eq!(err.stage, "payload_decode");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_answer_is_a_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"forecast":{"forecastday":[]}}"#)
            })
            .create_async()
            .await;

        let err = client_with_timeout(&server, 1).fetch(35.0, 33.0, date()).await.unwrap_err();
        assert_eq!(err.stage, "timeout");
    }
}
