//! OpenWeatherMap current-weather source.
//!
//! Requests `{endpoint}?id={city_id}&appid={api_key}&units={units}` and maps
//! the `main` block to a [`Reading`].

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::time::timeout;

use crate::config::SourceConfig;
use crate::reading::Reading;
use crate::source::{FetchError, ReadingSource};

/// Subset of the current-weather response we rely on.
#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainBlock,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

/// OpenWeatherMap source.
pub struct OpenWeatherSource {
    name: String,
    url: url::Url,
    timeout: Duration,
    client: Client,
}

impl OpenWeatherSource {
    /// Build a source from configuration.
    ///
    /// # Errors
    /// Returns `FetchError::Body` if the endpoint is not a valid URL and
    /// `FetchError::Network` if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let mut url = url::Url::parse(&config.endpoint)
            .map_err(|e| FetchError::Body(format!("invalid endpoint '{}': {e}", config.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("id", &config.city_id)
            .append_pair("appid", &config.api_key)
            .append_pair("units", &config.units);

        // Build HTTP client with timeout
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            name: format!("openweather:{}", config.city_id),
            url,
            timeout: config.timeout,
            client,
        })
    }

    async fn request(&self) -> Result<Reading, FetchError> {
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: WeatherResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(Reading::observed_now(
            parsed.main.temp,
            parsed.main.humidity,
            parsed.main.pressure,
        )?)
    }
}

impl std::fmt::Debug for OpenWeatherSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherSource")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ReadingSource for OpenWeatherSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Reading, FetchError> {
        let start = Instant::now();
        let result = match timeout(self.timeout, self.request()).await {
            Ok(Ok(reading)) => Ok(reading),
            Ok(Err(FetchError::Network(e))) if e.is_timeout() => {
                Err(FetchError::Timeout(self.timeout))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        };

        match &result {
            Ok(reading) => tracing::debug!(
                source = %self.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                temperature = reading.temperature(),
                humidity = reading.humidity(),
                pressure = reading.pressure(),
                "Fetched reading"
            ),
            Err(e) => tracing::debug!(
                source = %self.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Fetch failed"
            ),
        }
        result
    }
}
