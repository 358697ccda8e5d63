/// `registry/store.rs` — the shared composition store
///
/// `CompositionRegistry` is the one place the application reads "what is
/// currently playing" from. All operations are synchronous; mutation happens
/// under a single store lock, and listeners are invoked after the lock is
/// released so they can call back into the registry freely.
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::events::RegistryEvent;
use super::types::{CompositionSnapshot, Instrument, Sequence};
use crate::runtime::{InstrumentNode, RuntimeHandle};

/// Tempo restored by `reset()` and used before any `set_tempo` call.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

type Listener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

struct Store {
    instruments: HashMap<u64, Instrument>,
    /// Live runtime voices, keyed like `instruments`. Referenced, never copied.
    nodes: HashMap<u64, Arc<dyn InstrumentNode>>,
    sequences: HashMap<u64, Sequence>,
    tempo_bpm: f64,
    next_id: u64,
    runtime: Option<Arc<dyn RuntimeHandle>>,
}

impl Store {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared handle — lives in the application context, cloned freely.
#[derive(Clone)]
pub struct CompositionRegistry {
    store: Arc<Mutex<Store>>,
    listeners: Arc<Mutex<HashMap<u64, Listener>>>,
    next_listener_id: Arc<AtomicU64>,
}

impl CompositionRegistry {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                instruments: HashMap::new(),
                nodes: HashMap::new(),
                sequences: HashMap::new(),
                tempo_bpm: DEFAULT_TEMPO_BPM,
                next_id: 0,
                runtime: None,
            })),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wire the external runtime so tempo changes propagate into it.
    pub fn attach_runtime(&self, handle: Arc<dyn RuntimeHandle>) {
        self.store.lock().unwrap().runtime = Some(handle);
    }

    // ── Instruments ───────────────────────────────────────────────────────

    pub fn register_instrument(
        &self,
        name: &str,
        kind: &str,
        node: Option<Arc<dyn InstrumentNode>>,
    ) -> Instrument {
        let record = {
            let mut store = self.store.lock().unwrap();
            let id = store.fresh_id();
            let record = Instrument {
                id,
                name: name.to_string(),
                kind: kind.to_string(),
                created_at: chrono::Utc::now().timestamp_millis(),
            };
            store.instruments.insert(id, record.clone());
            if let Some(node) = node {
                store.nodes.insert(id, node);
            }
            record
        };
        log::debug!("registered instrument #{} `{}` ({})", record.id, name, kind);
        self.notify(&RegistryEvent::InstrumentAdded {
            id: record.id,
            name: record.name.clone(),
            kind: record.kind.clone(),
        });
        record
    }

    /// Remove an instrument and all of its sequences in one atomic step.
    /// No-op when the id is unknown — callers are best-effort cleanup paths.
    pub fn unregister_instrument(&self, id: u64) {
        let cascaded = {
            let mut store = self.store.lock().unwrap();
            if store.instruments.remove(&id).is_none() {
                return;
            }
            store.nodes.remove(&id);
            let owned: Vec<u64> = store
                .sequences
                .iter()
                .filter(|(_, s)| s.instrument_id == id)
                .map(|(sid, _)| *sid)
                .collect();
            for sid in &owned {
                store.sequences.remove(sid);
            }
            owned.len()
        };
        log::debug!("unregistered instrument #{id} ({cascaded} sequences cascaded)");
        self.notify(&RegistryEvent::InstrumentRemoved {
            id,
            sequences_removed: cascaded,
        });
    }

    /// Latest-registered instrument with the given binding name.
    pub fn instrument_by_name(&self, name: &str) -> Option<Instrument> {
        let store = self.store.lock().unwrap();
        store
            .instruments
            .values()
            .filter(|i| i.name == name)
            .max_by_key(|i| i.id)
            .cloned()
    }

    pub fn instrument(&self, id: u64) -> Option<Instrument> {
        self.store.lock().unwrap().instruments.get(&id).cloned()
    }

    /// Live runtime voice for an instrument, when one was attached.
    pub fn node(&self, id: u64) -> Option<Arc<dyn InstrumentNode>> {
        self.store.lock().unwrap().nodes.get(&id).cloned()
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        let store = self.store.lock().unwrap();
        let mut list: Vec<Instrument> = store.instruments.values().cloned().collect();
        list.sort_by_key(|i| i.id);
        list
    }

    // ── Sequences ─────────────────────────────────────────────────────────

    /// Register a sequence. The instrument id is not validated here — the
    /// executor's tracking is best-effort metadata, not script correctness.
    pub fn register_sequence(
        &self,
        instrument_id: u64,
        target: &str,
        values: Vec<serde_json::Value>,
        timings: Vec<f64>,
    ) -> Sequence {
        let record = {
            let mut store = self.store.lock().unwrap();
            let id = store.fresh_id();
            let record = Sequence {
                id,
                instrument_id,
                target: target.to_string(),
                values,
                timings,
                is_playing: true,
            };
            store.sequences.insert(id, record.clone());
            record
        };
        log::debug!(
            "registered sequence #{} on instrument #{} ({})",
            record.id,
            instrument_id,
            target
        );
        self.notify(&RegistryEvent::SequenceAdded {
            id: record.id,
            instrument_id,
            target: record.target.clone(),
        });
        record
    }

    pub fn unregister_sequence(&self, id: u64) {
        let removed = self.store.lock().unwrap().sequences.remove(&id).is_some();
        if removed {
            self.notify(&RegistryEvent::SequenceRemoved { id });
        }
    }

    pub fn sequences(&self) -> Vec<Sequence> {
        let store = self.store.lock().unwrap();
        let mut list: Vec<Sequence> = store.sequences.values().cloned().collect();
        list.sort_by_key(|s| s.id);
        list
    }

    // ── Tempo / snapshot / reset ──────────────────────────────────────────

    pub fn set_tempo(&self, bpm: f64) {
        let runtime = {
            let mut store = self.store.lock().unwrap();
            store.tempo_bpm = bpm;
            store.runtime.clone()
        };
        if let Some(runtime) = runtime {
            runtime.set_tempo(bpm);
        }
        self.notify(&RegistryEvent::TempoChanged { bpm });
    }

    pub fn tempo(&self) -> f64 {
        self.store.lock().unwrap().tempo_bpm
    }

    /// Immutable point-in-time view; instruments and sequences come back in
    /// creation order.
    pub fn snapshot(&self) -> CompositionSnapshot {
        let store = self.store.lock().unwrap();
        let mut instruments: Vec<Instrument> = store.instruments.values().cloned().collect();
        instruments.sort_by_key(|i| i.id);
        let mut sequences: Vec<Sequence> = store.sequences.values().cloned().collect();
        sequences.sort_by_key(|s| s.id);
        let is_playing = sequences.iter().any(|s| s.is_playing);
        CompositionSnapshot {
            tempo_bpm: store.tempo_bpm,
            instruments,
            sequences,
            is_playing,
            taken_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Clear both collections and restore the default tempo in one locked
    /// step, then notify.
    pub fn reset(&self) {
        let runtime = {
            let mut store = self.store.lock().unwrap();
            store.instruments.clear();
            store.nodes.clear();
            store.sequences.clear();
            store.tempo_bpm = DEFAULT_TEMPO_BPM;
            store.runtime.clone()
        };
        if let Some(runtime) = runtime {
            runtime.set_tempo(DEFAULT_TEMPO_BPM);
        }
        log::info!("composition registry reset");
        self.notify(&RegistryEvent::Reset);
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Register a listener invoked synchronously on every state transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id, Arc::new(listener));
        Subscription {
            id,
            registry: self.clone(),
        }
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().remove(&id);
    }

    fn notify(&self, event: &RegistryEvent) {
        // Snapshot the listener set first; listeners may re-enter the registry.
        let current: Vec<Listener> = self.listeners.lock().unwrap().values().cloned().collect();
        for listener in current {
            if catch_unwind(AssertUnwindSafe(|| (*listener)(event))).is_err() {
                log::warn!("registry listener panicked on `{}`", event.event_type());
            }
        }
    }
}

impl Default for CompositionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`CompositionRegistry::subscribe`]; cancel to stop
/// receiving events.
pub struct Subscription {
    id: u64,
    registry: CompositionRegistry,
}

impl Subscription {
    pub fn cancel(self) {
        self.registry.remove_listener(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn register_returns_fresh_ids() {
        let registry = CompositionRegistry::new();
        let a = registry.register_instrument("a", "Synth", None);
        let b = registry.register_instrument("b", "FmSynth", None);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.instruments().len(), 2);
    }

    #[test]
    fn unregister_cascades_exactly_its_own_sequences() {
        let registry = CompositionRegistry::new();
        let a = registry.register_instrument("a", "Synth", None);
        let b = registry.register_instrument("b", "Synth", None);
        registry.register_sequence(a.id, "note", vec![], vec![]);
        let b_seq = registry.register_sequence(b.id, "freq", vec![], vec![]);

        registry.unregister_instrument(a.id);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.instruments.len(), 1);
        assert_eq!(snapshot.instruments[0].id, b.id);
        assert_eq!(snapshot.sequences.len(), 1, "only B's sequence survives");
        assert_eq!(snapshot.sequences[0].id, b_seq.id);
    }

    #[test]
    fn unregister_unknown_ids_is_a_no_op() {
        let registry = CompositionRegistry::new();
        registry.unregister_instrument(999);
        registry.unregister_sequence(999);
        assert!(registry.snapshot().instruments.is_empty());
    }

    #[test]
    fn snapshot_derives_is_playing() {
        let registry = CompositionRegistry::new();
        assert!(!registry.snapshot().is_playing, "empty composition is silent");
        let a = registry.register_instrument("a", "Synth", None);
        registry.register_sequence(a.id, "note", vec![serde_json::json!(60)], vec![1.0]);
        assert!(registry.snapshot().is_playing);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = CompositionRegistry::new();
        let a = registry.register_instrument("a", "Synth", None);
        let snapshot = registry.snapshot();
        registry.unregister_instrument(a.id);
        assert_eq!(snapshot.instruments.len(), 1, "retained snapshot must not change");
    }

    #[test]
    fn reset_restores_defaults() {
        let registry = CompositionRegistry::new();
        let a = registry.register_instrument("a", "Synth", None);
        registry.register_sequence(a.id, "note", vec![], vec![]);
        registry.set_tempo(174.0);

        registry.reset();

        let snapshot = registry.snapshot();
        assert!((snapshot.tempo_bpm - DEFAULT_TEMPO_BPM).abs() < f64::EPSILON);
        assert!(snapshot.instruments.is_empty());
        assert!(snapshot.sequences.is_empty());
        assert!(!snapshot.is_playing);
    }

    #[test]
    fn tempo_pushes_into_an_attached_runtime() {
        use crate::runtime::stub::StubRuntime;
        let registry = CompositionRegistry::new();
        let stub = StubRuntime::new();
        let handle: Arc<dyn RuntimeHandle> = stub.clone();
        registry.attach_runtime(handle);

        registry.set_tempo(150.0);
        assert!((stub.tempo() - 150.0).abs() < f64::EPSILON);

        registry.reset();
        assert!((stub.tempo() - DEFAULT_TEMPO_BPM).abs() < f64::EPSILON);
    }

    #[test]
    fn instrument_by_name_prefers_the_latest() {
        let registry = CompositionRegistry::new();
        registry.register_instrument("bass", "Synth", None);
        let newer = registry.register_instrument("bass", "FmSynth", None);
        let found = registry.instrument_by_name("bass").expect("bass exists");
        assert_eq!(found.id, newer.id);
        assert!(registry.instrument_by_name("ghost").is_none());
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    #[test]
    fn listeners_observe_every_transition() {
        let registry = CompositionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = {
            let seen = Arc::clone(&seen);
            registry.subscribe(move |event| {
                seen.lock().unwrap().push(event.event_type());
            })
        };

        let a = registry.register_instrument("a", "Synth", None);
        registry.register_sequence(a.id, "note", vec![], vec![]);
        registry.set_tempo(90.0);
        registry.reset();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["instrument_added", "sequence_added", "tempo_changed", "reset"]
        );
        sub.cancel();
    }

    #[test]
    fn cancelled_subscriptions_stop_receiving() {
        let registry = CompositionRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let sub = {
            let count = Arc::clone(&count);
            registry.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        registry.reset();
        sub.cancel();
        registry.reset();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_listener_does_not_starve_the_rest() {
        let registry = CompositionRegistry::new();
        let _noisy = registry.subscribe(|_| panic!("listener bug"));
        let count = Arc::new(AtomicU32::new(0));
        let _counting = {
            let count = Arc::clone(&count);
            registry.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        registry.reset();
        registry.reset();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listeners_may_reenter_the_registry() {
        let registry = CompositionRegistry::new();
        let observed_tempo = Arc::new(Mutex::new(0.0));
        let _sub = {
            let registry = registry.clone();
            let observed = Arc::clone(&observed_tempo);
            registry.clone().subscribe(move |event| {
                if matches!(event, RegistryEvent::Reset) {
                    *observed.lock().unwrap() = registry.snapshot().tempo_bpm;
                }
            })
        };

        registry.set_tempo(99.0);
        registry.reset();
        assert!((*observed_tempo.lock().unwrap() - DEFAULT_TEMPO_BPM).abs() < f64::EPSILON);
    }
}
