/// `registry/events.rs` — state-change notifications
///
/// Every registry mutation emits one `RegistryEvent` to all subscribed
/// listeners, synchronously and in subscription-independent order.
use serde::{Deserialize, Serialize};

/// A registry state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    InstrumentAdded {
        id: u64,
        name: String,
        kind: String,
    },
    /// Cascaded sequence removals are folded into the one event.
    InstrumentRemoved {
        id: u64,
        sequences_removed: usize,
    },
    SequenceAdded {
        id: u64,
        instrument_id: u64,
        target: String,
    },
    SequenceRemoved {
        id: u64,
    },
    TempoChanged {
        bpm: f64,
    },
    /// Both collections cleared and tempo restored to the default.
    Reset,
}

impl RegistryEvent {
    /// Stable tag for logging and listener dispatch.
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::InstrumentAdded { .. } => "instrument_added",
            RegistryEvent::InstrumentRemoved { .. } => "instrument_removed",
            RegistryEvent::SequenceAdded { .. } => "sequence_added",
            RegistryEvent::SequenceRemoved { .. } => "sequence_removed",
            RegistryEvent::TempoChanged { .. } => "tempo_changed",
            RegistryEvent::Reset => "reset",
        }
    }
}
