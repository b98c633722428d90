//! Resource limits for sandboxed execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum accepted source length, in UTF-16 code units.
pub const MAX_CODE_LENGTH: usize = 12_000;

/// Lower bound for the per-invocation timeout.
pub const MIN_TIMEOUT_MS: u64 = 250;

/// Upper bound for the per-invocation timeout.
pub const MAX_TIMEOUT_MS: u64 = 5_000;

/// Timeout used when the caller supplies none, or something unusable.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_500;

/// V8 heap ceiling for one isolate.
pub const MEMORY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// V8 stack ceiling, applied process-wide through the engine flags.
pub const STACK_SIZE_BYTES: usize = 512 * 1024;

/// Console lines kept per stream.
pub const MAX_LOG_LINES: usize = 200;

/// Array items / object keys kept per level by the result sanitizer.
pub const MAX_COLLECTION_ITEMS: usize = 200;

/// Nesting depth walked by the result sanitizer.
pub const MAX_SERIALIZATION_DEPTH: usize = 6;

/// Resource limits for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionLimits {
    /// Maximum source length accepted by the tool schema
    pub max_code_length: usize,

    /// Smallest timeout a caller may request
    pub min_timeout_ms: u64,

    /// Largest timeout a caller may request
    pub max_timeout_ms: u64,

    /// Timeout used when none is requested
    pub default_timeout_ms: u64,

    /// Maximum V8 heap size in bytes
    pub memory_limit_bytes: usize,

    /// Maximum V8 stack size in bytes
    pub stack_size_bytes: usize,

    /// Console lines kept per stream
    pub max_log_lines: usize,

    /// Items kept per array/object level when serializing the result
    pub max_collection_items: usize,

    /// Depth walked when serializing the result
    pub max_serialization_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_code_length: MAX_CODE_LENGTH,
            min_timeout_ms: MIN_TIMEOUT_MS,
            max_timeout_ms: MAX_TIMEOUT_MS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit_bytes: MEMORY_LIMIT_BYTES,
            stack_size_bytes: STACK_SIZE_BYTES,
            max_log_lines: MAX_LOG_LINES,
            max_collection_items: MAX_COLLECTION_ITEMS,
            max_serialization_depth: MAX_SERIALIZATION_DEPTH,
        }
    }
}

/// How a requested timeout was turned into the effective one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSource {
    /// The request was inside the allowed range
    Requested,
    /// The request was outside the range and clamped to the nearest bound
    Clamped,
    /// No usable request; the default applies
    Default,
}

impl ExecutionLimits {
    /// Clamp a requested timeout into `[min_timeout_ms, max_timeout_ms]`.
    ///
    /// Missing and NaN requests fall back to `default_timeout_ms`; everything
    /// else is floored to whole milliseconds first.
    pub fn clamp_timeout(&self, requested_ms: Option<f64>) -> (Duration, TimeoutSource) {
        let Some(requested) = requested_ms.filter(|ms| !ms.is_nan()) else {
            return (
                Duration::from_millis(self.default_timeout_ms),
                TimeoutSource::Default,
            );
        };

        let floored = requested.floor();
        let min = self.min_timeout_ms as f64;
        let max = self.max_timeout_ms as f64;
        if floored < min {
            (Duration::from_millis(self.min_timeout_ms), TimeoutSource::Clamped)
        } else if floored > max {
            (Duration::from_millis(self.max_timeout_ms), TimeoutSource::Clamped)
        } else {
            (Duration::from_millis(floored as u64), TimeoutSource::Requested)
        }
    }
}
