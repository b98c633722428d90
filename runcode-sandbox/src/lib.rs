//! runcode sandbox - isolated JavaScript execution for tool calls
//!
//! Runs short, untrusted JavaScript snippets in a fresh V8 isolate per call,
//! with a hard deadline, a heap ceiling, captured console output and a single
//! host capability (`api.getWeather`). Every call yields an [`ExecutionResult`].

mod bridge;
mod coerce;
mod config;
mod deadline;
mod error;
mod execution;
mod executor;
mod limits;
mod runtime;
mod scripts;
mod tool;
mod types;
mod weather;

pub use bridge::{BridgeHandler, BridgeRegistry, WeatherBridge, WEATHER_BRIDGE};
pub use coerce::{
    coerce_number, coordinates_from_value, extract_location_hints, normalize_text,
    validate_coordinates,
};
pub use config::{SandboxConfig, WeatherConfig, REQUEST_TIMEOUT_MS, WEATHER_ENDPOINT};
pub use deadline::Deadline;
pub use error::{ErrorKind, Result, SandboxError, SerializableError};
pub use execution::{ExecutionId, ExecutionPhase, PhaseTracker};
pub use executor::{execute_sandbox_code, SandboxExecutor, HOST_GRACE};
pub use limits::{
    ExecutionLimits, TimeoutSource, DEFAULT_TIMEOUT_MS, MAX_CODE_LENGTH, MAX_COLLECTION_ITEMS,
    MAX_LOG_LINES, MAX_SERIALIZATION_DEPTH, MAX_TIMEOUT_MS, MEMORY_LIMIT_BYTES, MIN_TIMEOUT_MS,
    STACK_SIZE_BYTES,
};
pub use runtime::{Engine, IsolateRuntime, V8Isolate};
pub use tool::{input_schema, RunCodeTool, ToolDefinition, TOOL_NAME};
pub use types::{
    CapturedOutput, Coordinates, ErrorResult, ExecutionEnvironment, ExecutionInput,
    ExecutionResult, ExecutionSummary, ExecutionTrailer, Language, LocationHints, RequestHints,
    SuccessResult, SummaryStatus,
};
pub use weather::{OpenMeteoClient, WeatherClient};
