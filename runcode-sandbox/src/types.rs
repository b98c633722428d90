//! Core types for sandbox execution

use crate::coerce::deserialize_lenient_number;
use crate::error::{SandboxError, SerializableError};
use crate::limits::ExecutionLimits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Languages the sandbox can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
        }
    }
}

impl FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Language::JavaScript),
            other => Err(SandboxError::Validation(format!(
                "Unsupported language '{}'; only 'javascript' is supported",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_language() -> String {
    Language::JavaScript.as_str().to_string()
}

/// Request to execute code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    /// Source language; anything but `javascript` is rejected
    #[serde(default = "default_language")]
    pub language: String,

    /// The code to execute
    pub code: String,

    /// Requested timeout; non-numeric values deserialize to `None`
    #[serde(default, deserialize_with = "deserialize_lenient_number")]
    pub timeout_ms: Option<f64>,
}

impl ExecutionInput {
    /// Create a JavaScript execution request with the default timeout
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            language: default_language(),
            code: code.into(),
            timeout_ms: None,
        }
    }

    /// Set the requested timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: f64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Override the language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Source length as JavaScript counts it (UTF-16 code units).
    pub fn code_size(&self) -> usize {
        self.code.encode_utf16().count()
    }
}

/// Untrusted geo hints forwarded by the surrounding chat request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestHints {
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[serde(default)]
    pub city: Option<Value>,
    #[serde(default)]
    pub country: Option<Value>,
}

/// Normalized location hints; each field is independently present or null
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationHints {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl LocationHints {
    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.city.is_none()
            && self.country.is_none()
    }
}

/// Validated coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Descriptive metadata attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEnvironment {
    /// Language tag as requested, even when it was rejected
    pub language: String,
    pub runtime: String,
    pub timeout_ms: u64,
    pub limits: ExecutionLimits,
    pub location_hints: Option<LocationHints>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Ok,
    Error,
}

/// Outcome produced inside the isolate by the summary script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub status: SummaryStatus,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub error: Option<SerializableError>,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub truncated_stdout: usize,
    #[serde(default)]
    pub truncated_stderr: usize,
}

/// Console output captured from the isolate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub truncated_stdout: usize,
    pub truncated_stderr: usize,
}

impl ExecutionSummary {
    /// Split the summary into its console capture and its outcome.
    pub fn into_parts(self) -> (CapturedOutput, std::result::Result<Value, SerializableError>) {
        let output = CapturedOutput {
            stdout: self.stdout,
            stderr: self.stderr,
            truncated_stdout: self.truncated_stdout,
            truncated_stderr: self.truncated_stderr,
        };
        let outcome = match self.status {
            SummaryStatus::Ok => Ok(self.value),
            SummaryStatus::Error => Err(self.error.unwrap_or_else(|| {
                SerializableError::new("Error", "Execution failed without an error value")
            })),
        };
        (output, outcome)
    }
}

/// Fields shared by both result shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrailer {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub truncated_stdout: usize,
    pub truncated_stderr: usize,
    pub runtime_ms: u64,
    pub code_size: usize,
    pub environment: ExecutionEnvironment,
}

impl ExecutionTrailer {
    pub fn new(
        output: CapturedOutput,
        runtime_ms: u64,
        code_size: usize,
        environment: ExecutionEnvironment,
    ) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            truncated_stdout: output.truncated_stdout,
            truncated_stderr: output.truncated_stderr,
            runtime_ms,
            code_size,
            environment,
        }
    }
}

/// Successful execution; `error` is always `null` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResult {
    pub result: Value,
    #[serde(default)]
    error: (),
    #[serde(flatten)]
    pub trailer: ExecutionTrailer,
}

impl SuccessResult {
    pub fn new(result: Value, trailer: ExecutionTrailer) -> Self {
        Self {
            result,
            error: (),
            trailer,
        }
    }
}

/// Failed execution; `result` is always `null` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    #[serde(default)]
    result: (),
    pub error: SerializableError,
    #[serde(flatten)]
    pub trailer: ExecutionTrailer,
}

impl ErrorResult {
    pub fn new(error: SerializableError, trailer: ExecutionTrailer) -> Self {
        Self {
            result: (),
            error,
            trailer,
        }
    }
}

/// Result of code execution, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionResult {
    Ok(SuccessResult),
    Error(ErrorResult),
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn success(&self) -> bool {
        matches!(self, ExecutionResult::Ok(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            ExecutionResult::Ok(ok) => Some(&ok.result),
            ExecutionResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SerializableError> {
        match self {
            ExecutionResult::Ok(_) => None,
            ExecutionResult::Error(err) => Some(&err.error),
        }
    }

    pub fn trailer(&self) -> &ExecutionTrailer {
        match self {
            ExecutionResult::Ok(ok) => &ok.trailer,
            ExecutionResult::Error(err) => &err.trailer,
        }
    }

    pub fn stdout(&self) -> &[String] {
        &self.trailer().stdout
    }

    pub fn stderr(&self) -> &[String] {
        &self.trailer().stderr
    }

    pub fn runtime_ms(&self) -> u64 {
        self.trailer().runtime_ms
    }

    /// Render as plain JSON for the model-visible tool result.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({
                "status": "error",
                "result": null,
                "error": { "name": "VMError", "message": err.to_string(), "stack": null },
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn environment() -> ExecutionEnvironment {
        ExecutionEnvironment {
            language: "javascript".into(),
            runtime: "v8".into(),
            timeout_ms: 1_500,
            limits: ExecutionLimits::default(),
            location_hints: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("javascript".parse::<Language>().unwrap(), Language::JavaScript);
        assert!(matches!(
            "python".parse::<Language>(),
            Err(SandboxError::Validation(_))
        ));
    }

    #[test]
    fn test_input_defaults_and_lenient_timeout() {
        let input: ExecutionInput =
            serde_json::from_value(json!({ "code": "1", "timeoutMs": "soon" })).unwrap();
        assert_eq!(input.language, "javascript");
        assert_eq!(input.timeout_ms, None);

        let input: ExecutionInput =
            serde_json::from_value(json!({ "code": "1", "timeoutMs": 800 })).unwrap();
        assert_eq!(input.timeout_ms, Some(800.0));
    }

    #[test]
    fn test_code_size_counts_utf16_units() {
        assert_eq!(ExecutionInput::new("abc").code_size(), 3);
        assert_eq!(ExecutionInput::new("😀").code_size(), 2);
    }

    #[test]
    fn test_success_wire_shape() {
        let trailer = ExecutionTrailer::new(CapturedOutput::default(), 3, 12, environment());
        let result = ExecutionResult::Ok(SuccessResult::new(json!(2), trailer));
        let wire = result.to_json();
        assert_eq!(wire["status"], "ok");
        assert_eq!(wire["result"], 2);
        assert!(wire["error"].is_null());
        assert_eq!(wire["runtimeMs"], 3);
        assert_eq!(wire["codeSize"], 12);
        assert_eq!(wire["environment"]["timeoutMs"], 1_500);
    }

    #[test]
    fn test_error_wire_shape_round_trips() {
        let trailer = ExecutionTrailer::new(
            CapturedOutput {
                stdout: vec!["hi".into()],
                ..Default::default()
            },
            1,
            5,
            environment(),
        );
        let result =
            ExecutionResult::Error(ErrorResult::new(SerializableError::new("Error", "boom"), trailer));
        let wire = result.to_json();
        assert_eq!(wire["status"], "error");
        assert!(wire["result"].is_null());
        assert_eq!(wire["error"]["message"], "boom");
        assert_eq!(wire["stdout"], json!(["hi"]));

        let back: ExecutionResult = serde_json::from_value(wire).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_summary_into_parts() {
        let summary: ExecutionSummary = serde_json::from_value(json!({
            "status": "error",
            "error": { "name": "Error", "message": "boom", "stack": null },
            "stdout": ["hi"],
            "stderr": [],
            "truncatedStdout": 0,
            "truncatedStderr": 0
        }))
        .unwrap();
        let (output, outcome) = summary.into_parts();
        assert_eq!(output.stdout, vec!["hi".to_string()]);
        assert_eq!(outcome.unwrap_err().message, "boom");
    }
}
