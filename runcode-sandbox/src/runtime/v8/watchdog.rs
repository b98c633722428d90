//! Deadline watchdog
//!
//! A plain OS thread that terminates the isolate when the deadline passes.
//! Synchronous infinite loops never yield to the event loop, so an async
//! timer alone cannot stop them.

use crate::deadline::Deadline;
use crate::error::{Result, SandboxError};
use deno_core::v8;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Interrupts raised against an isolate, recorded before termination.
#[derive(Debug, Default)]
pub(crate) struct InterruptFlags {
    timed_out: AtomicBool,
    memory_exceeded: AtomicBool,
}

impl InterruptFlags {
    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    /// Returns `true` only for the first call.
    pub fn mark_memory_exceeded(&self) -> bool {
        !self.memory_exceeded.swap(true, Ordering::SeqCst)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    pub fn memory_exceeded(&self) -> bool {
        self.memory_exceeded.load(Ordering::SeqCst)
    }
}

pub(crate) struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(handle: v8::IsolateHandle, deadline: Deadline, flags: Arc<InterruptFlags>) -> Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("runcode-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(deadline.remaining()) {
                    flags.mark_timed_out();
                    handle.terminate_execution();
                    tracing::debug!(timeout_ms = deadline.budget_ms(), "Watchdog terminated isolate");
                }
            })
            .map_err(|e| SandboxError::vm(format!("Failed to spawn watchdog: {}", e)))?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    /// Stop the watchdog and wait for its thread; idempotent.
    pub fn disarm(&mut self) {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
