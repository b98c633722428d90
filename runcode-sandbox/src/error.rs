//! Error types for sandbox execution

use serde::{Deserialize, Serialize};

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Everything that can stop an invocation short of a user-code exception.
///
/// User-code exceptions are caught inside the isolate and reported through the
/// execution summary; they never become a `SandboxError`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    /// Malformed input: wrong language, bad bridge payload, bad coordinates
    #[error("{0}")]
    Validation(String),

    /// The invocation deadline passed
    #[error("Execution timed out after {timeout_ms} ms")]
    Timeout {
        /// Effective timeout of the invocation
        timeout_ms: u64,
    },

    /// Failure raised by the isolation backend itself
    #[error("{message}")]
    Vm {
        /// Error name reported by the backend
        name: String,
        /// Error message
        message: String,
        /// Isolate-side stack, when the backend produced one
        stack: Option<String>,
    },

    /// The isolate hit its heap ceiling
    #[error("Memory limit of {limit_bytes} bytes exceeded")]
    MemoryLimit {
        /// Configured heap ceiling
        limit_bytes: usize,
    },

    /// The weather provider answered with a failure, or could not be reached
    #[error("{}", weather_message(*status, body))]
    WeatherApi {
        /// HTTP status, if a response arrived at all
        status: Option<u16>,
        /// Truncated response body or transport error text
        body: String,
    },
}

fn weather_message(status: Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("Weather API request failed with status {}: {}", status, body),
        None => format!("Weather API request failed: {}", body),
    }
}

/// Coarse classification of a [`SandboxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Timeout,
    Vm,
    ExternalApi,
}

impl SandboxError {
    /// Build a generic backend failure.
    pub fn vm(message: impl Into<String>) -> Self {
        SandboxError::Vm {
            name: "VMError".to_string(),
            message: message.into(),
            stack: None,
        }
    }

    /// Canonical classification; the only place error kinds are decided.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Validation(_) => ErrorKind::Validation,
            SandboxError::Timeout { .. } => ErrorKind::Timeout,
            SandboxError::Vm { .. } | SandboxError::MemoryLimit { .. } => ErrorKind::Vm,
            SandboxError::WeatherApi { .. } => ErrorKind::ExternalApi,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Whether the failure points at the sandbox itself rather than at the
    /// input or an upstream provider.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SandboxError::Vm { .. } | SandboxError::MemoryLimit { .. })
    }

    /// Name used when the error crosses the tool boundary.
    pub fn name(&self) -> &str {
        match self {
            SandboxError::Validation(_) => "ValidationError",
            SandboxError::Timeout { .. } => "TimeoutError",
            SandboxError::Vm { name, .. } => name,
            SandboxError::MemoryLimit { .. } => "MemoryLimitError",
            SandboxError::WeatherApi { .. } => "WeatherAPIError",
        }
    }
}

impl From<serde_json::Error> for SandboxError {
    fn from(err: serde_json::Error) -> Self {
        SandboxError::vm(format!("JSON error: {}", err))
    }
}

/// Host-safe projection of any error that reaches the tool boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl SerializableError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

impl From<&SandboxError> for SerializableError {
    fn from(err: &SandboxError) -> Self {
        // Only isolate-side stacks are kept; host stacks never leave the process.
        let stack = match err {
            SandboxError::Vm { stack, .. } => stack.clone(),
            _ => None,
        };
        Self {
            name: err.name().to_string(),
            message: err.to_string(),
            stack,
        }
    }
}
