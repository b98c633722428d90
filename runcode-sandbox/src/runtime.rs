//! Isolate runtime abstraction and the process-wide engine

pub mod v8;

use crate::bridge::BridgeRegistry;
use crate::deadline::Deadline;
use crate::limits::{ExecutionLimits, STACK_SIZE_BYTES};
use crate::Result;
use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;

pub use self::v8::V8Isolate;

/// One isolate per invocation, driven from a single thread.
///
/// Every method observes the invocation deadline; a timeout or a heap
/// interrupt surfaces as the matching [`crate::SandboxError`].
#[async_trait(?Send)]
pub trait IsolateRuntime {
    /// Run a script synchronously and return its completion value as a string.
    fn evaluate_script(&mut self, name: &'static str, source: String) -> Result<String>;

    /// Run a script whose completion value is a promise and wait for it to settle.
    async fn evaluate_async_script(&mut self, name: &'static str, source: String) -> Result<()>;

    /// Drive pending jobs and host callbacks until the isolate is idle.
    async fn pump(&mut self) -> Result<()>;

    /// Clear a pending interrupt so one final script can run, bounded by `budget`.
    fn recover(&mut self, budget: Duration) -> Result<()>;

    /// Release the isolate.
    fn dispose(self)
    where
        Self: Sized;
}

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Process-wide engine state; initialized once, before the first isolate.
#[derive(Debug)]
pub struct Engine {
    version: &'static str,
    stack_size_bytes: usize,
}

impl Engine {
    /// The shared engine, initializing V8 on first use.
    pub fn shared() -> &'static Engine {
        ENGINE.get_or_init(|| Engine::initialize(STACK_SIZE_BYTES))
    }

    fn initialize(stack_size_bytes: usize) -> Engine {
        // V8 flags are process-global and must be set before any isolate exists.
        let flags = vec![
            "runcode".to_string(),
            format!("--stack-size={}", stack_size_bytes / 1024),
        ];
        let unrecognized = deno_core::v8_set_flags(flags);
        if unrecognized.len() > 1 {
            tracing::warn!(flags = ?&unrecognized[1..], "V8 ignored engine flags");
        }

        let version = deno_core::v8::V8::get_version();
        tracing::debug!(version, stack_size_bytes, "V8 engine initialized");
        Engine {
            version,
            stack_size_bytes,
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Stack ceiling actually in effect for every isolate.
    pub fn stack_size_bytes(&self) -> usize {
        self.stack_size_bytes
    }

    /// Runtime description reported in the execution environment.
    pub fn runtime_label(&self) -> String {
        format!("v8 {} (deno_core)", self.version)
    }

    /// Create a fresh isolate with the bridges installed and host globals removed.
    pub fn create_isolate(
        &self,
        limits: &ExecutionLimits,
        deadline: Deadline,
        bridges: BridgeRegistry,
    ) -> Result<V8Isolate> {
        V8Isolate::new(limits, deadline, bridges)
    }
}
