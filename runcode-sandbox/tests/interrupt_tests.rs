//! Interrupted runs must release their isolate thread
//!
//! Kept in its own test binary so no other test's isolate threads are alive
//! while live threads are counted.

mod common;

use common::*;
use runcode_sandbox::HOST_GRACE;
use std::time::Duration;

const TIMEOUT_MS: u64 = 250;

/// Threads spawned by the executor: isolates and their watchdogs.
#[cfg(target_os = "linux")]
fn live_sandbox_threads() -> usize {
    let Ok(tasks) = std::fs::read_dir("/proc/self/task") else {
        return 0;
    };
    tasks
        .filter_map(|task| task.ok())
        .filter_map(|task| std::fs::read_to_string(task.path().join("comm")).ok())
        .filter(|name| name.starts_with("runcode-"))
        .count()
}

#[cfg(not(target_os = "linux"))]
fn live_sandbox_threads() -> usize {
    0
}

async fn wait_for_sandbox_threads_to_exit() -> usize {
    for _ in 0..40 {
        if live_sandbox_threads() == 0 {
            return 0;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    live_sandbox_threads()
}

#[tokio::test]
async fn test_interrupted_runs_do_not_outlive_the_deadline() {
    let cases: [(&str, &[&str]); 3] = [
        // Getter that never returns, reached while the result is sanitized.
        ("console.log('built'); return { get x() { while (true) {} } };", &["built"]),
        // Shared references that fan out to 200^6 visits.
        ("let v = [1]; for (let i = 0; i < 6; i++) v = Array(200).fill(v); return v;", &[]),
        // Attempts to swap the capture arrays for a trapping Proxy.
        (r#"
            const trap = new Proxy([], { get() { for (;;) {} } });
            try { __sandboxCapture.stdout = trap; } catch (_) {}
            try { Object.defineProperty(globalThis, "__sandboxCapture", { value: { stdout: trap } }); } catch (_) {}
            console.log("kept");
            for (;;) {}
        "#, &["kept"]),
    ];

    let limit = TIMEOUT_MS + HOST_GRACE.as_millis() as u64;
    for (code, stdout) in cases {
        let result = run_with_timeout(code, TIMEOUT_MS as f64).await;
        assert_eq!(error_name(&result), "TimeoutError", "{}", code);
        assert!(
            result.runtime_ms() < limit,
            "runtime {} for {}",
            result.runtime_ms(),
            code
        );
        assert_eq!(result.stdout(), stdout, "{}", code);
        assert_eq!(wait_for_sandbox_threads_to_exit().await, 0, "thread left running for {}", code);
    }
}
