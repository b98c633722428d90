//! Weather provider client used by the `api.getWeather` bridge
//!
//! This is the only network egress of the sandbox.

use crate::config::WeatherConfig;
use crate::error::{Result, SandboxError};
use crate::types::Coordinates;
use async_trait::async_trait;
use std::time::Duration;

/// Fetches a raw forecast body for a coordinate pair.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// Fetch the forecast, giving up after `timeout` (further capped by the
    /// client's own request limit).
    async fn fetch_weather(&self, coordinates: Coordinates, timeout: Duration) -> Result<String>;
}

/// Open-Meteo forecast client
pub struct OpenMeteoClient {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl OpenMeteoClient {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        // Each invocation drives requests from its own short-lived runtime;
        // idle pooled connections would be bound to a runtime that is gone.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| SandboxError::vm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }
}

#[async_trait]
impl WeatherClient for OpenMeteoClient {
    async fn fetch_weather(&self, coordinates: Coordinates, timeout: Duration) -> Result<String> {
        let timeout = timeout.min(self.config.request_timeout());
        let timeout_ms = timeout.as_millis() as u64;

        tracing::debug!(
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            timeout_ms,
            "Fetching weather"
        );

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("latitude", coordinates.latitude.to_string()),
                ("longitude", coordinates.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout_ms))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(e, timeout_ms))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Weather provider returned an error");
            return Err(SandboxError::WeatherApi {
                status: Some(status.as_u16()),
                body: snippet(&body, self.config.error_body_chars),
            });
        }

        Ok(body)
    }
}

fn request_error(err: reqwest::Error, timeout_ms: u64) -> SandboxError {
    if err.is_timeout() {
        SandboxError::Timeout { timeout_ms }
    } else {
        SandboxError::WeatherApi {
            status: err.status().map(|s| s.as_u16()),
            body: err.to_string(),
        }
    }
}

fn snippet(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}
