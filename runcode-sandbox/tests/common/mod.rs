//! Shared helpers for sandbox integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use runcode_sandbox::{
    Coordinates, ExecutionInput, ExecutionResult, RequestHints, SandboxConfig, SandboxError,
    SandboxExecutor, WeatherClient,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WEATHER_BODY: &str =
    r#"{"latitude":10.0,"longitude":20.0,"current":{"temperature_2m":21.5},"daily":{"sunrise":["06:01"],"sunset":["18:02"]}}"#;

/// Weather client that answers from memory and records every call
pub struct StubWeather {
    reply: std::result::Result<String, SandboxError>,
    calls: Mutex<Vec<(Coordinates, Duration)>>,
}

impl StubWeather {
    pub fn ok(body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(body.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: SandboxError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Coordinates, Duration)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherClient for StubWeather {
    async fn fetch_weather(
        &self,
        coordinates: Coordinates,
        timeout: Duration,
    ) -> runcode_sandbox::Result<String> {
        self.calls.lock().unwrap().push((coordinates, timeout));
        self.reply.clone()
    }
}

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("runcode_sandbox=debug")
        .with_test_writer()
        .try_init();
}

pub fn executor_with(weather: Arc<StubWeather>) -> SandboxExecutor {
    setup_test_logging();
    SandboxExecutor::with_weather_client(SandboxConfig::default(), weather)
}

pub fn executor() -> SandboxExecutor {
    executor_with(StubWeather::ok(WEATHER_BODY))
}

pub async fn run(code: &str) -> ExecutionResult {
    executor()
        .execute(ExecutionInput::new(code), &RequestHints::default())
        .await
}

pub async fn run_with_timeout(code: &str, timeout_ms: f64) -> ExecutionResult {
    executor()
        .execute(
            ExecutionInput::new(code).with_timeout_ms(timeout_ms),
            &RequestHints::default(),
        )
        .await
}

pub fn error_name(result: &ExecutionResult) -> &str {
    result
        .error()
        .map(|error| error.name.as_str())
        .unwrap_or("<none>")
}
