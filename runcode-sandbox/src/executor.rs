//! Sandbox executor - main entry point
//!
//! Owns the invocation lifecycle: clamp the timeout, describe the
//! environment, run bootstrap/api/user code/summary in a fresh isolate on a
//! dedicated thread, and fold every outcome into an [`ExecutionResult`].

use crate::bridge::{BridgeRegistry, WeatherBridge, WEATHER_BRIDGE};
use crate::coerce::extract_location_hints;
use crate::config::SandboxConfig;
use crate::deadline::Deadline;
use crate::error::{Result, SandboxError, SerializableError};
use crate::execution::{ExecutionId, ExecutionPhase, PhaseTracker};
use crate::limits::{ExecutionLimits, TimeoutSource};
use crate::runtime::{Engine, IsolateRuntime, V8Isolate};
use crate::scripts;
use crate::types::{
    CapturedOutput, ErrorResult, ExecutionEnvironment, ExecutionInput, ExecutionResult,
    ExecutionSummary, ExecutionTrailer, Language, LocationHints, RequestHints, SuccessResult,
};
use crate::weather::{OpenMeteoClient, WeatherClient};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// How long the host waits past the deadline for the isolate thread.
pub const HOST_GRACE: Duration = Duration::from_millis(1_000);

/// Time allowed for reading console output back after an interrupt.
const SALVAGE_BUDGET: Duration = Duration::from_millis(100);

/// Native stack of the isolate thread; must exceed the V8 stack ceiling.
const ISOLATE_THREAD_STACK_BYTES: usize = 4 * 1024 * 1024;

/// A failed run together with whatever console output could be salvaged.
struct Failure {
    error: SandboxError,
    output: CapturedOutput,
}

impl From<SandboxError> for Failure {
    fn from(error: SandboxError) -> Self {
        Self {
            error,
            output: CapturedOutput::default(),
        }
    }
}

/// Everything the isolate thread needs; moved onto that thread.
struct IsolateJob {
    id: ExecutionId,
    code: String,
    location: Option<LocationHints>,
    limits: ExecutionLimits,
    deadline: Deadline,
    bridges: BridgeRegistry,
    engine: &'static Engine,
}

/// Runs untrusted JavaScript, one fresh isolate per call
pub struct SandboxExecutor {
    config: SandboxConfig,
    engine: &'static Engine,
    weather: Arc<dyn WeatherClient>,
}

static DEFAULT_EXECUTOR: OnceLock<std::result::Result<SandboxExecutor, SandboxError>> = OnceLock::new();

/// Run code with the default configuration; never fails.
pub async fn execute_sandbox_code(input: ExecutionInput, hints: &RequestHints) -> ExecutionResult {
    let started = Instant::now();
    match DEFAULT_EXECUTOR.get_or_init(|| SandboxExecutor::new(SandboxConfig::default())) {
        Ok(executor) => executor.execute(input, hints).await,
        Err(err) => {
            tracing::error!(error = %err, "Sandbox executor unavailable");
            rejected_result(
                &SandboxConfig::default().limits,
                "unavailable",
                &input,
                hints,
                err.clone(),
                started,
            )
        }
    }
}

impl SandboxExecutor {
    /// Create an executor backed by the Open-Meteo client
    pub fn new(config: SandboxConfig) -> Result<Self> {
        config.validate()?;
        let weather = OpenMeteoClient::new(config.weather.clone())?;
        Ok(Self::with_weather_client(config, Arc::new(weather)))
    }

    /// Create an executor with a custom weather client
    pub fn with_weather_client(config: SandboxConfig, weather: Arc<dyn WeatherClient>) -> Self {
        Self {
            config,
            engine: Engine::shared(),
            weather,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.config.limits
    }

    /// Execute code; every failure becomes an error result.
    pub async fn execute(&self, input: ExecutionInput, hints: &RequestHints) -> ExecutionResult {
        let started = Instant::now();
        let id = ExecutionId::new();
        let code_size = input.code_size();
        let (timeout, source) = self.config.limits.clamp_timeout(input.timeout_ms);
        let deadline = Deadline::starting_at(started, timeout);
        let location = extract_location_hints(hints);
        let environment = self.describe_environment(&input, timeout, source, location.as_ref());

        tracing::info!(
            execution_id = %id,
            code_len = code_size,
            timeout_ms = deadline.budget_ms(),
            "Executing sandboxed code"
        );

        let outcome = self.run(id, input, location, deadline).await;
        let runtime_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => tracing::info!(execution_id = %id, runtime_ms, "Execution finished"),
            Err(failure) if failure.error.is_infrastructure() => tracing::error!(
                execution_id = %id,
                runtime_ms,
                error = %failure.error,
                "Sandbox failure"
            ),
            Err(failure) => tracing::warn!(
                execution_id = %id,
                runtime_ms,
                error_name = failure.error.name(),
                error = %failure.error,
                "Execution failed"
            ),
        }

        assemble(outcome, runtime_ms, code_size, environment)
    }

    /// Error result for input rejected before any isolate is created.
    ///
    /// `started` is when the invocation began, so `runtimeMs` covers validation too.
    pub fn reject(
        &self,
        input: &ExecutionInput,
        hints: &RequestHints,
        error: SandboxError,
        started: Instant,
    ) -> ExecutionResult {
        tracing::debug!(error = %error, "Execution input rejected");
        rejected_result(
            &self.config.limits,
            &self.engine.runtime_label(),
            input,
            hints,
            error,
            started,
        )
    }

    fn describe_environment(
        &self,
        input: &ExecutionInput,
        timeout: Duration,
        source: TimeoutSource,
        location: Option<&LocationHints>,
    ) -> ExecutionEnvironment {
        let mut warnings = Vec::new();
        match (source, input.timeout_ms) {
            (TimeoutSource::Clamped, Some(requested)) => warnings.push(format!(
                "Requested timeout {} ms was clamped to {} ms",
                requested,
                timeout.as_millis()
            )),
            (TimeoutSource::Default, _) => warnings.push(format!(
                "No usable timeout requested; using default {} ms",
                timeout.as_millis()
            )),
            (TimeoutSource::Clamped, None) | (TimeoutSource::Requested, _) => {}
        }
        if location.is_none() {
            warnings.push("Location hints unavailable".to_string());
        }

        let mut limits = self.config.limits.clone();
        limits.stack_size_bytes = self.engine.stack_size_bytes();

        ExecutionEnvironment {
            language: input.language.clone(),
            runtime: self.engine.runtime_label(),
            timeout_ms: timeout.as_millis() as u64,
            limits,
            location_hints: location.cloned(),
            warnings,
        }
    }

    async fn run(
        &self,
        id: ExecutionId,
        input: ExecutionInput,
        location: Option<LocationHints>,
        deadline: Deadline,
    ) -> std::result::Result<ExecutionSummary, Failure> {
        input.language.parse::<Language>()?;

        let bridges = BridgeRegistry::new().with_handler(
            WEATHER_BRIDGE,
            Arc::new(WeatherBridge::new(self.weather.clone(), deadline)),
        );
        let job = IsolateJob {
            id,
            code: input.code,
            location,
            limits: self.config.limits.clone(),
            deadline,
            bridges,
            engine: self.engine,
        };

        let (result_tx, result_rx) = oneshot::channel();
        std::thread::Builder::new()
            .name(format!("runcode-isolate-{}", id))
            .stack_size(ISOLATE_THREAD_STACK_BYTES)
            .spawn(move || {
                let outcome = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(job.run()),
                    Err(e) => Err(Failure::from(SandboxError::vm(format!(
                        "Failed to build isolate runtime: {}",
                        e
                    )))),
                };
                let _ = result_tx.send(outcome);
            })
            .map_err(|e| SandboxError::vm(format!("Failed to spawn isolate thread: {}", e)))?;

        match tokio::time::timeout_at(deadline.tokio_instant() + HOST_GRACE, result_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SandboxError::vm("Isolate thread exited without a result").into()),
            Err(_) => {
                tracing::error!(execution_id = %id, "Isolate thread missed the deadline grace period");
                Err(SandboxError::Timeout {
                    timeout_ms: deadline.budget_ms(),
                }
                .into())
            }
        }
    }
}

impl IsolateJob {
    async fn run(self) -> std::result::Result<ExecutionSummary, Failure> {
        let mut phases = PhaseTracker::new(self.id);
        let mut isolate = match self
            .engine
            .create_isolate(&self.limits, self.deadline, self.bridges.clone())
        {
            Ok(isolate) => isolate,
            Err(error) => {
                phases.dispose();
                return Err(error.into());
            }
        };

        let outcome = match self.drive(&mut isolate, &mut phases).await {
            Ok(summary) => Ok(summary),
            Err(error) => {
                phases.fail();
                let output = if phases.visited(ExecutionPhase::BootstrapRun) {
                    salvage_output(&mut isolate)
                } else {
                    CapturedOutput::default()
                };
                Err(Failure { error, output })
            }
        };

        isolate.dispose();
        phases.dispose();
        outcome
    }

    async fn drive(&self, isolate: &mut V8Isolate, phases: &mut PhaseTracker) -> Result<ExecutionSummary> {
        isolate.evaluate_script("<sandbox:bootstrap>", scripts::bootstrap_script(&self.limits))?;
        phases.advance(ExecutionPhase::BootstrapRun)?;

        isolate.evaluate_script(
            "<sandbox:api>",
            scripts::api_script(WEATHER_BRIDGE, self.location.as_ref()),
        )?;
        phases.advance(ExecutionPhase::ApiInstalled)?;

        phases.advance(ExecutionPhase::UserCodeRunning)?;
        isolate
            .evaluate_async_script("<sandbox:execute>", scripts::execution_script(&self.code))
            .await?;

        let summary = isolate.evaluate_script("<sandbox:summary>", scripts::summary_script(&self.limits))?;
        let summary: ExecutionSummary = serde_json::from_str(&summary)?;
        phases.advance(ExecutionPhase::SummaryCollected)?;
        Ok(summary)
    }
}

/// Recover console output after an interrupted run.
fn salvage_output(isolate: &mut V8Isolate) -> CapturedOutput {
    if let Err(err) = isolate.recover(SALVAGE_BUDGET) {
        tracing::warn!(error = %err, "Console output not salvaged");
        return CapturedOutput::default();
    }
    isolate
        .evaluate_script("<sandbox:salvage>", scripts::salvage_script())
        .ok()
        .and_then(|json| serde_json::from_str::<ExecutionSummary>(&json).ok())
        .map(|summary| summary.into_parts().0)
        .unwrap_or_default()
}

fn assemble(
    outcome: std::result::Result<ExecutionSummary, Failure>,
    runtime_ms: u64,
    code_size: usize,
    environment: ExecutionEnvironment,
) -> ExecutionResult {
    match outcome {
        Ok(summary) => {
            let (output, outcome) = summary.into_parts();
            let trailer = ExecutionTrailer::new(output, runtime_ms, code_size, environment);
            match outcome {
                Ok(value) => ExecutionResult::Ok(SuccessResult::new(value, trailer)),
                Err(error) => {
                    tracing::debug!(error_name = %error.name, "User code threw");
                    ExecutionResult::Error(ErrorResult::new(error, trailer))
                }
            }
        }
        Err(Failure { error, output }) => {
            let trailer = ExecutionTrailer::new(output, runtime_ms, code_size, environment);
            ExecutionResult::Error(ErrorResult::new(SerializableError::from(&error), trailer))
        }
    }
}

fn rejected_result(
    limits: &ExecutionLimits,
    runtime: &str,
    input: &ExecutionInput,
    hints: &RequestHints,
    error: SandboxError,
    started: Instant,
) -> ExecutionResult {
    let (timeout, _) = limits.clamp_timeout(input.timeout_ms);
    let location_hints = extract_location_hints(hints);
    let environment = ExecutionEnvironment {
        language: input.language.clone(),
        runtime: runtime.to_string(),
        timeout_ms: timeout.as_millis() as u64,
        limits: limits.clone(),
        warnings: Vec::new(),
        location_hints,
    };
    let runtime_ms = started.elapsed().as_millis() as u64;
    let trailer = ExecutionTrailer::new(CapturedOutput::default(), runtime_ms, input.code_size(), environment);
    ExecutionResult::Error(ErrorResult::new(SerializableError::from(&error), trailer))
}
