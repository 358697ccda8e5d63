/// `error.rs` — sandbox error taxonomy
///
/// Every failure path of the execution core is represented as data.
/// Callers pattern-match on `SandboxError` instead of catching exceptions;
/// no raw `mlua::Error` ever escapes the sandbox boundary.
use serde::{Deserialize, Serialize};

/// Classified failure of a script execution attempt.
///
/// Immutable once constructed. `RuntimeFailure` preserves the original VM
/// error text; `cause` carries the inner error message when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SandboxError {
    /// No live runtime handle is attached yet.
    #[error("runtime not ready")]
    NotReady,

    /// The static gate rejected the source — the script was never executed.
    #[error("invalid source: {message}")]
    InvalidSource { message: String },

    /// The script raised during execution.
    #[error("runtime failure: {message}")]
    RuntimeFailure {
        message: String,
        cause: Option<String>,
    },

    /// The deadline fired before the script settled. The script may still
    /// be running on its worker thread.
    #[error("execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl SandboxError {
    /// Stable tag for logging and UI dispatch.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::NotReady => "not_ready",
            SandboxError::InvalidSource { .. } => "invalid_source",
            SandboxError::RuntimeFailure { .. } => "runtime_failure",
            SandboxError::Timeout { .. } => "timeout",
        }
    }

    pub fn runtime_failure(message: impl Into<String>) -> Self {
        SandboxError::RuntimeFailure {
            message: message.into(),
            cause: None,
        }
    }

    /// Normalize a raised VM error.
    ///
    /// Already-typed sandbox errors raised by capability callbacks pass
    /// through unchanged; anything else is wrapped as `RuntimeFailure` with
    /// the original message and cause preserved.
    pub(crate) fn from_vm_error(err: &mlua::Error) -> Self {
        // mlua's downcast_ref walks CallbackError/ExternalError wrapping.
        if let Some(typed) = err.downcast_ref::<SandboxError>() {
            return typed.clone();
        }
        SandboxError::RuntimeFailure {
            message: err.to_string(),
            cause: std::error::Error::source(err).map(|c| c.to_string()),
        }
    }
}
