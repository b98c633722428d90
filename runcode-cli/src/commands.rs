//! CLI command implementations

use anyhow::{Context, Result};
use runcode_sandbox::{
    ExecutionInput, ExecutionResult, RequestHints, RunCodeTool, SandboxConfig, SandboxExecutor,
};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    match path {
        Some(path) => SandboxConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(SandboxConfig::default()),
    }
}

fn read_source(file: &str) -> Result<String> {
    if file == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("Failed to read code from stdin")?;
        Ok(code)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
    }
}

/// Build request hints from raw command-line strings; coercion happens in the sandbox.
pub fn request_hints(
    latitude: Option<String>,
    longitude: Option<String>,
    city: Option<String>,
    country: Option<String>,
) -> RequestHints {
    RequestHints {
        latitude: latitude.map(Value::String),
        longitude: longitude.map(Value::String),
        city: city.map(Value::String),
        country: country.map(Value::String),
    }
}

/// Run a source file through the `runCode` tool.
pub async fn run_code(
    file: &str,
    timeout_ms: Option<f64>,
    hints: RequestHints,
    config: Option<&Path>,
) -> Result<ExecutionResult> {
    let config = load_config(config)?;
    let executor = SandboxExecutor::new(config).context("Failed to create sandbox executor")?;
    let tool = RunCodeTool::new(Arc::new(executor));

    let code = read_source(file)?;
    debug!(file, code_len = code.len(), "Running code");

    let mut input = ExecutionInput::new(code);
    if let Some(timeout_ms) = timeout_ms {
        input = input.with_timeout_ms(timeout_ms);
    }
    let arguments = serde_json::to_value(&input)?;
    Ok(tool.call(arguments, &hints).await)
}

pub fn print_result(result: &ExecutionResult, pretty: bool) -> Result<()> {
    let json = result.to_json();
    let rendered = if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Print the tool definition as JSON.
pub fn print_schema(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let executor = SandboxExecutor::new(config).context("Failed to create sandbox executor")?;
    let definition = RunCodeTool::new(Arc::new(executor)).definition();
    println!("{}", serde_json::to_string_pretty(&definition)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_hints_keep_raw_strings() {
        let hints = request_hints(Some("52.5".into()), None, Some("Berlin".into()), None);
        assert_eq!(hints.latitude, Some(Value::String("52.5".into())));
        assert_eq!(hints.longitude, None);
        assert_eq!(hints.city, Some(Value::String("Berlin".into())));
    }

    #[test]
    fn test_missing_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/runcode.toml"))).is_err());
        assert!(load_config(None).is_ok());
    }
}
