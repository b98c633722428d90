//! Sandbox configuration

use crate::error::{Result, SandboxError};
use crate::limits::ExecutionLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Weather provider endpoint used by `api.getWeather`.
pub const WEATHER_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";

/// Hard cap on one weather request, independent of the invocation deadline.
pub const REQUEST_TIMEOUT_MS: u64 = 7_500;

/// Characters of a failed response body kept in the error.
pub const ERROR_BODY_SNIPPET_CHARS: usize = 200;

/// Top-level sandbox configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Execution limits
    pub limits: ExecutionLimits,
    /// Weather bridge configuration
    pub weather: WeatherConfig,
}

/// Weather bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherConfig {
    /// Forecast endpoint (GET)
    pub endpoint: String,
    /// Per-request cap in milliseconds
    pub request_timeout_ms: u64,
    /// Characters of an error body kept in `WeatherApi` errors
    pub error_body_chars: usize,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: WEATHER_ENDPOINT.to_string(),
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            error_body_chars: ERROR_BODY_SNIPPET_CHARS,
        }
    }
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SandboxConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SandboxConfig = toml::from_str(content)
            .map_err(|e| SandboxError::Validation(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Validation(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Sandbox config loaded");
        Ok(config)
    }

    /// Reject limit combinations the executor cannot honor
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.min_timeout_ms == 0 || limits.min_timeout_ms > limits.max_timeout_ms {
            return Err(SandboxError::Validation(format!(
                "Invalid timeout range [{}, {}]",
                limits.min_timeout_ms, limits.max_timeout_ms
            )));
        }
        if !(limits.min_timeout_ms..=limits.max_timeout_ms).contains(&limits.default_timeout_ms) {
            return Err(SandboxError::Validation(format!(
                "Default timeout {} ms is outside [{}, {}]",
                limits.default_timeout_ms, limits.min_timeout_ms, limits.max_timeout_ms
            )));
        }
        if limits.max_code_length == 0 || limits.memory_limit_bytes == 0 {
            return Err(SandboxError::Validation(
                "Code length and memory limits must be non-zero".to_string(),
            ));
        }
        if self.weather.request_timeout_ms == 0 {
            return Err(SandboxError::Validation(
                "Weather request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
