//! V8 isolate backend using deno_core

mod allocator;
mod ops;
mod watchdog;

use self::allocator::{budgeted_allocator, BufferBudget};
use self::watchdog::{InterruptFlags, Watchdog};
use super::IsolateRuntime;
use crate::bridge::BridgeRegistry;
use crate::deadline::Deadline;
use crate::error::{Result, SandboxError};
use crate::limits::ExecutionLimits;
use crate::scripts;
use async_trait::async_trait;
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

enum PromiseOutcome {
    Pending,
    Fulfilled,
    Rejected(String),
}

/// A single-use V8 isolate bound to one invocation deadline
pub struct V8Isolate {
    // Declared before `runtime` so the watchdog thread is joined first.
    watchdog: Watchdog,
    runtime: JsRuntime,
    deadline: Deadline,
    interrupts: Arc<InterruptFlags>,
    buffers: Arc<BufferBudget>,
    memory_limit_bytes: usize,
}

impl V8Isolate {
    pub(crate) fn new(
        limits: &ExecutionLimits,
        deadline: Deadline,
        bridges: BridgeRegistry,
    ) -> Result<Self> {
        let buffers = BufferBudget::new(limits.memory_limit_bytes);
        let create_params = v8::CreateParams::default()
            .heap_limits(0, limits.memory_limit_bytes)
            .array_buffer_allocator(budgeted_allocator(&buffers));
        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![ops::sandbox_extension()],
            create_params: Some(create_params),
            ..Default::default()
        });

        let interrupts = Arc::new(InterruptFlags::default());
        let heap_flags = interrupts.clone();
        let heap_handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current, _initial| {
            if heap_flags.mark_memory_exceeded() {
                heap_handle.terminate_execution();
            }
            // Headroom for the termination to unwind instead of aborting the process.
            current * 2
        });

        let watchdog = Watchdog::arm(
            runtime.v8_isolate().thread_safe_handle(),
            deadline,
            interrupts.clone(),
        )?;

        let install = bridges.install_script();
        runtime.op_state().borrow_mut().put(bridges);

        let mut isolate = Self {
            watchdog,
            runtime,
            deadline,
            interrupts,
            buffers,
            memory_limit_bytes: limits.memory_limit_bytes,
        };
        isolate.evaluate_script("<sandbox:bridges>", install)?;
        isolate.evaluate_script("<sandbox:environment>", scripts::environment_script())?;
        Ok(isolate)
    }

    fn timeout_error(&self) -> SandboxError {
        SandboxError::Timeout {
            timeout_ms: self.deadline.budget_ms(),
        }
    }

    /// Classify a backend failure; interrupt flags win over the reported error.
    fn failure(&self, err: impl Display) -> SandboxError {
        if self.interrupts.memory_exceeded() {
            return SandboxError::MemoryLimit {
                limit_bytes: self.memory_limit_bytes,
            };
        }
        if self.interrupts.timed_out() {
            return self.timeout_error();
        }
        vm_error(&err.to_string())
    }

    fn promise_outcome(&mut self, value: &v8::Global<v8::Value>) -> PromiseOutcome {
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) else {
            return PromiseOutcome::Fulfilled;
        };
        match promise.state() {
            v8::PromiseState::Pending => PromiseOutcome::Pending,
            v8::PromiseState::Fulfilled => PromiseOutcome::Fulfilled,
            v8::PromiseState::Rejected => {
                let reason = promise.result(scope);
                PromiseOutcome::Rejected(reason.to_rust_string_lossy(scope))
            }
        }
    }
}

#[async_trait(?Send)]
impl IsolateRuntime for V8Isolate {
    fn evaluate_script(&mut self, name: &'static str, source: String) -> Result<String> {
        let value = match self.runtime.execute_script(name, source) {
            Ok(value) => value,
            Err(err) => return Err(self.failure(err)),
        };
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        Ok(local.to_rust_string_lossy(scope))
    }

    async fn evaluate_async_script(&mut self, name: &'static str, source: String) -> Result<()> {
        let value = match self.runtime.execute_script(name, source) {
            Ok(value) => value,
            Err(err) => return Err(self.failure(err)),
        };

        if let PromiseOutcome::Pending = self.promise_outcome(&value) {
            self.pump().await?;
        }

        match self.promise_outcome(&value) {
            PromiseOutcome::Fulfilled => Ok(()),
            PromiseOutcome::Rejected(reason) => Err(self.failure(format!("Uncaught (in promise) {}", reason))),
            PromiseOutcome::Pending => {
                // Idle event loop: nothing left that could settle the promise.
                tracing::debug!(script = name, "Promise stalled; waiting for deadline");
                tokio::time::sleep_until(self.deadline.tokio_instant()).await;
                Err(self.timeout_error())
            }
        }
    }

    async fn pump(&mut self) -> Result<()> {
        let deadline = self.deadline.tokio_instant();
        let polled = tokio::time::timeout_at(
            deadline,
            self.runtime.run_event_loop(PollEventLoopOptions::default()),
        )
        .await;
        match polled {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(self.failure(err)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn recover(&mut self, budget: Duration) -> Result<()> {
        self.watchdog.disarm();
        self.runtime.v8_isolate().cancel_terminate_execution();
        // Armed after the cancel; a firing before it would be cleared.
        self.watchdog = Watchdog::arm(
            self.runtime.v8_isolate().thread_safe_handle(),
            Deadline::after(budget),
            self.interrupts.clone(),
        )?;
        Ok(())
    }

    fn dispose(mut self) {
        self.watchdog.disarm();
        tracing::trace!(buffer_bytes = self.buffers.used(), "Isolate disposed");
    }
}

/// Split deno_core's rendered error ("Uncaught TypeError: msg\n    at ...")
/// into name, message and stack.
fn vm_error(rendered: &str) -> SandboxError {
    let rendered = rendered.trim();
    let (head, stack) = match rendered.split_once('\n') {
        Some((head, rest)) => (head, Some(rest.to_string())),
        None => (rendered, None),
    };
    let head = head
        .strip_prefix("Uncaught (in promise) ")
        .or_else(|| head.strip_prefix("Uncaught "))
        .unwrap_or(head);

    let (name, message) = match head.split_once(": ") {
        Some((name, message)) if is_error_name(name) => (name.to_string(), message.to_string()),
        _ => ("VMError".to_string(), head.to_string()),
    };
    SandboxError::Vm {
        name,
        message,
        stack,
    }
}

fn is_error_name(candidate: &str) -> bool {
    candidate.ends_with("Error")
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_splits_rendered_error() {
        let err = vm_error("Uncaught SyntaxError: Unexpected token ')'\n    at <sandbox:execute>:3:1");
        assert_eq!(
            err,
            SandboxError::Vm {
                name: "SyntaxError".into(),
                message: "Unexpected token ')'".into(),
                stack: Some("    at <sandbox:execute>:3:1".into()),
            }
        );
    }

    #[test]
    fn test_vm_error_without_name() {
        let err = vm_error("Uncaught (in promise) 42");
        assert_eq!(err.name(), "VMError");
        assert_eq!(err.to_string(), "42");
    }
}
