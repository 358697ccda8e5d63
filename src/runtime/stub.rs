/// `runtime/stub.rs` — recording no-op backend
///
/// Stub implementations — a full integration wires a real synthesis engine
/// behind `RuntimeHandle`. Every capability call is logged and counted so
/// tests can observe exactly what a script did (or prove it never ran).
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{EffectNode, InstrumentNode, RuntimeHandle};
use crate::error::SandboxError;

/// In-memory runtime that records calls instead of making sound.
pub struct StubRuntime {
    tempo_bpm: Mutex<f64>,
    created_kinds: Mutex<Vec<String>>,
    /// Total capability invocations across the runtime and every node it
    /// handed out — the side-effect probe used by executor tests.
    invocations: Arc<AtomicU64>,
}

impl StubRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tempo_bpm: Mutex::new(120.0),
            created_kinds: Mutex::new(Vec::new()),
            invocations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of capability calls observed so far.
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Constructor kinds in creation order.
    pub fn created_kinds(&self) -> Vec<String> {
        self.created_kinds.lock().unwrap().clone()
    }
}

impl RuntimeHandle for StubRuntime {
    fn create_instrument(&self, kind: &str) -> Result<Arc<dyn InstrumentNode>, SandboxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.created_kinds.lock().unwrap().push(kind.to_string());
        log::debug!("[stub] create_instrument({kind})");
        Ok(Arc::new(StubInstrument {
            kind: kind.to_string(),
            params: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            invocations: Arc::clone(&self.invocations),
        }))
    }

    fn create_effect(&self, kind: &str) -> Result<Arc<dyn EffectNode>, SandboxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.created_kinds.lock().unwrap().push(kind.to_string());
        log::debug!("[stub] create_effect({kind})");
        Ok(Arc::new(StubEffect {
            kind: kind.to_string(),
            invocations: Arc::clone(&self.invocations),
        }))
    }

    fn set_tempo(&self, bpm: f64) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        log::debug!("[stub] set_tempo({bpm})");
        *self.tempo_bpm.lock().unwrap() = bpm;
    }

    fn tempo(&self) -> f64 {
        *self.tempo_bpm.lock().unwrap()
    }
}

/// Instrument voice that records parameter writes and scheduled calls.
pub struct StubInstrument {
    kind: String,
    params: Mutex<HashMap<String, serde_json::Value>>,
    calls: Mutex<Vec<String>>,
    invocations: Arc<AtomicU64>,
}

impl StubInstrument {
    pub fn param(&self, name: &str) -> Option<serde_json::Value> {
        self.params.lock().unwrap().get(name).cloned()
    }

    /// Human-readable trace of trigger/schedule calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl InstrumentNode for StubInstrument {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn set_param(&self, name: &str, value: serde_json::Value) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        log::debug!("[stub] {}.{name} = {value}", self.kind);
        self.params.lock().unwrap().insert(name.to_string(), value);
    }

    fn trigger(&self, param: &str, value: serde_json::Value) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        log::debug!("[stub] {}.{param}({value})", self.kind);
        self.calls.lock().unwrap().push(format!("{param}({value})"));
    }

    fn schedule(&self, target: &str, values: &[serde_json::Value], timings: &[f64]) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "[stub] {}.{target}.seq({} values, {} timings)",
            self.kind,
            values.len(),
            timings.len()
        );
        self.calls
            .lock()
            .unwrap()
            .push(format!("{target}.seq[{}/{}]", values.len(), timings.len()));
    }
}

/// Effect unit stub — parameter writes only.
pub struct StubEffect {
    kind: String,
    invocations: Arc<AtomicU64>,
}

impl EffectNode for StubEffect {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn set_param(&self, name: &str, value: serde_json::Value) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        log::debug!("[stub] {}.{name} = {value}", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_creations_and_counts_invocations() {
        let runtime = StubRuntime::new();
        assert_eq!(runtime.invocation_count(), 0);

        let synth = runtime.create_instrument("Synth").unwrap();
        runtime.create_effect("Reverb").unwrap();
        synth.set_param("gain", serde_json::json!(0.5));
        synth.trigger("note", serde_json::json!(60));

        assert_eq!(runtime.created_kinds(), vec!["Synth", "Reverb"]);
        assert_eq!(runtime.invocation_count(), 4);
    }

    #[test]
    fn tempo_round_trips() {
        let runtime = StubRuntime::new();
        assert!((runtime.tempo() - 120.0).abs() < f64::EPSILON);
        runtime.set_tempo(140.0);
        assert!((runtime.tempo() - 140.0).abs() < f64::EPSILON);
    }
}
