//! `runCode` tool definition for the tool-calling layer

use crate::error::SandboxError;
use crate::executor::SandboxExecutor;
use crate::limits::ExecutionLimits;
use crate::types::{ExecutionInput, ExecutionResult, RequestHints};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Name under which the tool is registered.
pub const TOOL_NAME: &str = "runCode";

const TOOL_DESCRIPTION: &str = "Run a short JavaScript snippet in an isolated sandbox and return its result. \
The code runs as the body of an async function: use `return` (or a single expression) to produce the result, \
and `await` freely. console.log/info/warn/debug output is captured as stdout and console.error as stderr. \
There is no filesystem, network, process, require, fetch or timer access. Two helpers are available: \
`await api.getWeather({ latitude, longitude })` returns the current, hourly and daily forecast, and \
`await api.getEstimatedLocation()` returns the user's approximate location ({ latitude, longitude, city, country }) or null.";

/// Tool metadata handed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The `runCode` tool: schema plus argument handling over a [`SandboxExecutor`]
#[derive(Clone)]
pub struct RunCodeTool {
    executor: Arc<SandboxExecutor>,
}

impl RunCodeTool {
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        Self { executor }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            input_schema: input_schema(self.executor.limits()),
        }
    }

    /// Run raw tool arguments; malformed arguments become a validation error result.
    pub async fn call(&self, arguments: Value, hints: &RequestHints) -> ExecutionResult {
        let started = Instant::now();
        let input = match serde_json::from_value::<ExecutionInput>(arguments.clone()) {
            Ok(input) => input,
            Err(err) => {
                let fallback = ExecutionInput::new(
                    arguments
                        .get("code")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                );
                return self.executor.reject(
                    &fallback,
                    hints,
                    SandboxError::Validation(format!("Invalid runCode arguments: {}", err)),
                    started,
                );
            }
        };

        let max = self.executor.limits().max_code_length;
        let size = input.code_size();
        if size == 0 || size > max {
            let error = SandboxError::Validation(format!(
                "code must be between 1 and {} characters (got {})",
                max, size
            ));
            return self.executor.reject(&input, hints, error, started);
        }

        self.executor.execute(input, hints).await
    }
}

/// JSON schema of the tool input.
pub fn input_schema(limits: &ExecutionLimits) -> Value {
    json!({
        "type": "object",
        "properties": {
            "language": {
                "type": "string",
                "enum": ["javascript"],
                "default": "javascript",
                "description": "Source language; only JavaScript is supported"
            },
            "code": {
                "type": "string",
                "minLength": 1,
                "maxLength": limits.max_code_length,
                "description": "JavaScript to run as the body of an async function"
            },
            "timeoutMs": {
                "type": "integer",
                "minimum": limits.min_timeout_ms,
                "maximum": limits.max_timeout_ms,
                "default": limits.default_timeout_ms,
                "description": "Execution timeout in milliseconds"
            }
        },
        "required": ["code"],
        "additionalProperties": false
    })
}
