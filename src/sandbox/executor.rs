/// `sandbox/executor.rs` — timed, validated script execution
///
/// Each run: static gate, fresh sandboxed VM with the capability surface
/// installed, then a race between script completion and the deadline timer.
/// Lua is synchronous, so the script body runs inside `spawn_blocking`; when
/// the deadline fires first the caller observes `Timeout` but the worker
/// thread is not preempted — a documented limitation, not a rollback.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::extract::SourceScanner;
use super::surface::{self, ScriptLog};
use super::vm::create_sandboxed_vm;
use crate::error::SandboxError;
use crate::registry::CompositionRegistry;
use crate::runtime::{RuntimeHandle, RuntimeManager};
use crate::validator::Classifier;

/// Hard ceiling on any configured deadline, to stop runaway configuration.
pub const MAX_TIMEOUT_MS: u64 = 30_000;

/// Deadline applied when the caller does not choose one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

// ── Options / outcome ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Wall-clock budget in milliseconds, clamped to [`MAX_TIMEOUT_MS`].
    pub timeout_ms: u64,
    /// Run the static gate before executing.
    pub validate: bool,
    /// Scan the source for declarations after a successful run.
    pub track: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            validate: true,
            track: true,
        }
    }
}

/// Normalized result of one execution attempt. Exactly one of
/// `return_value` / `failure` is populated, according to `succeeded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub return_value: Option<serde_json::Value>,
    pub failure: Option<SandboxError>,
    pub elapsed_ms: u64,
    /// Lines the script wrote through the `log` capability.
    pub output: Vec<String>,
}

impl ExecutionOutcome {
    fn success(return_value: Option<serde_json::Value>, elapsed_ms: u64, output: Vec<String>) -> Self {
        Self {
            succeeded: true,
            return_value,
            failure: None,
            elapsed_ms,
            output,
        }
    }

    fn failed(failure: SandboxError, elapsed_ms: u64, output: Vec<String>) -> Self {
        Self {
            succeeded: false,
            return_value: None,
            failure: Some(failure),
            elapsed_ms,
            output,
        }
    }
}

/// Per-invocation lifecycle. Terminal phases are final — retries are the
/// caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionPhase {
    Validating,
    Rejected,
    Executing,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionPhase {
    fn as_str(self) -> &'static str {
        match self {
            ExecutionPhase::Validating => "validating",
            ExecutionPhase::Rejected => "rejected",
            ExecutionPhase::Executing => "executing",
            ExecutionPhase::Succeeded => "succeeded",
            ExecutionPhase::Failed => "failed",
            ExecutionPhase::TimedOut => "timed_out",
        }
    }
}

// ── ScriptExecutor ────────────────────────────────────────────────────────────

/// Shared handle — one per application context.
#[derive(Clone)]
pub struct ScriptExecutor {
    classifier: Arc<Classifier>,
    scanner: Arc<SourceScanner>,
    runtime: RuntimeManager,
    registry: CompositionRegistry,
}

impl ScriptExecutor {
    pub fn new(runtime: RuntimeManager, registry: CompositionRegistry) -> Self {
        Self {
            classifier: Arc::new(Classifier::new()),
            scanner: Arc::new(SourceScanner::new()),
            runtime,
            registry,
        }
    }

    /// Validate, bind and run one candidate script against the deadline.
    ///
    /// Never raises: every failure path is returned as data.
    pub async fn execute(&self, source: &str, options: &ExecutionOptions) -> ExecutionOutcome {
        let started = Instant::now();
        log::debug!("execution phase: {}", ExecutionPhase::Validating.as_str());

        let Some(handle) = self.runtime.handle() else {
            log::debug!("execution phase: {}", ExecutionPhase::Failed.as_str());
            return ExecutionOutcome::failed(SandboxError::NotReady, 0, Vec::new());
        };

        if options.validate {
            let verdict = self.classifier.classify(source);
            if !verdict.is_acceptable {
                let message = verdict.blocking_messages().join("; ");
                log::info!("script rejected by static gate: {message}");
                log::debug!("execution phase: {}", ExecutionPhase::Rejected.as_str());
                return ExecutionOutcome::failed(
                    SandboxError::InvalidSource { message },
                    elapsed_ms(started),
                    Vec::new(),
                );
            }
        }

        let timeout_ms = options.timeout_ms.min(MAX_TIMEOUT_MS);
        log::debug!("execution phase: {}", ExecutionPhase::Executing.as_str());

        let sink: ScriptLog = Arc::new(Mutex::new(Vec::new()));
        let task = {
            let source = source.to_string();
            let handle = Arc::clone(&handle);
            let sink = Arc::clone(&sink);
            tokio::task::spawn_blocking(move || run_in_vm(&source, &handle, &sink))
        };

        let raced = tokio::time::timeout(Duration::from_millis(timeout_ms), task).await;
        let elapsed = elapsed_ms(started);
        let output = drain_output(&sink);

        match raced {
            Err(_) => {
                log::warn!("script timed out after {timeout_ms} ms (worker thread not preempted)");
                log::debug!("execution phase: {}", ExecutionPhase::TimedOut.as_str());
                ExecutionOutcome::failed(SandboxError::Timeout { timeout_ms }, elapsed, output)
            }
            Ok(Err(join_err)) => {
                log::debug!("execution phase: {}", ExecutionPhase::Failed.as_str());
                ExecutionOutcome::failed(
                    SandboxError::runtime_failure(format!("script task panicked: {join_err}")),
                    elapsed,
                    output,
                )
            }
            Ok(Ok(Err(failure))) => {
                log::debug!("execution phase: {}", ExecutionPhase::Failed.as_str());
                ExecutionOutcome::failed(failure, elapsed, output)
            }
            Ok(Ok(Ok(return_value))) => {
                if options.track {
                    self.track(source);
                }
                log::debug!("execution phase: {}", ExecutionPhase::Succeeded.as_str());
                ExecutionOutcome::success(return_value, elapsed, output)
            }
        }
    }

    /// Run scripts strictly in order, stopping at the first failed outcome.
    /// Outcomes for every attempted script are returned.
    pub async fn execute_sequence(
        &self,
        scripts: &[String],
        options: &ExecutionOptions,
    ) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(scripts.len());
        for (index, source) in scripts.iter().enumerate() {
            let outcome = self.execute(source, options).await;
            let failed = !outcome.succeeded;
            outcomes.push(outcome);
            if failed {
                log::info!(
                    "script {} of {} failed; remaining scripts skipped",
                    index + 1,
                    scripts.len()
                );
                break;
            }
        }
        outcomes
    }

    /// Best-effort composition tracking from the original source text.
    fn track(&self, source: &str) {
        let mut by_name: HashMap<String, u64> = HashMap::new();
        for decl in self.scanner.instruments(source) {
            let record = self.registry.register_instrument(&decl.name, &decl.kind, None);
            by_name.insert(decl.name, record.id);
        }
        for seq in self.scanner.sequences(source) {
            let instrument_id = by_name.get(&seq.instrument).copied().or_else(|| {
                self.registry
                    .instrument_by_name(&seq.instrument)
                    .map(|i| i.id)
            });
            let Some(instrument_id) = instrument_id else {
                log::debug!("sequence on unknown binding `{}` skipped", seq.instrument);
                continue;
            };
            self.registry
                .register_sequence(instrument_id, &seq.target, seq.values, seq.timings);
        }
    }
}

// ── VM entry point (blocking) ─────────────────────────────────────────────────

fn run_in_vm(
    source: &str,
    handle: &Arc<dyn RuntimeHandle>,
    sink: &ScriptLog,
) -> Result<Option<serde_json::Value>, SandboxError> {
    let lua = create_sandboxed_vm().map_err(|e| {
        SandboxError::runtime_failure(format!("failed to create script VM: {e}"))
    })?;

    surface::install(&lua, handle, sink).map_err(|e| {
        SandboxError::runtime_failure(format!("capability surface installation failed: {e}"))
    })?;

    match lua.load(source).eval::<mlua::Value>() {
        Ok(mlua::Value::Nil) => Ok(None),
        Ok(value) => Ok(Some(surface::lua_value_to_json(value))),
        Err(err) => Err(SandboxError::from_vm_error(&err)),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn drain_output(sink: &ScriptLog) -> Vec<String> {
    sink.lock()
        .unwrap()
        .iter()
        .map(|e| format!("[{}] {}", e.level, e.message))
        .collect()
}
