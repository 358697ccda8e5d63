//! cadenza — AI live-coding audio runtime core.
//!
//! An untrusted textual script (typically generated by a language model)
//! drives a live audio runtime through a hard trust boundary:
//!
//! - [`validator`] — static pattern classifier gating candidate scripts,
//! - [`sandbox`] — capability-bound Lua VM raced against a deadline,
//! - [`registry`] — concurrently observed record of what scripts created,
//! - [`runtime`] — the opaque boundary to the external synthesis engine.
//!
//! The gate is heuristic and the deadline does not preempt a busy script —
//! this is a best-effort gate plus a hard wall-clock cutoff, not a proof of
//! safety.
pub mod error;
pub mod registry;
pub mod runtime;
pub mod sandbox;
pub mod state;
pub mod validator;

pub use error::SandboxError;
pub use registry::{
    CompositionRegistry, CompositionSnapshot, Instrument, RegistryEvent, Sequence, Subscription,
    DEFAULT_TEMPO_BPM,
};
pub use runtime::{EffectNode, InstrumentNode, RuntimeHandle, RuntimeManager};
pub use sandbox::executor::{
    ExecutionOptions, ExecutionOutcome, ScriptExecutor, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};
pub use state::AppState;
pub use validator::{Classifier, Finding, Severity, ValidationVerdict};
