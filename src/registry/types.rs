/// `registry/types.rs` — tracked composition records
///
/// Plain serializable records. The registry owns them exclusively from
/// registration to removal; runtime nodes are referenced separately and
/// never serialized.
use serde::{Deserialize, Serialize};

/// A tracked instrument created by an accepted script (or explicit call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: u64,
    /// Author-chosen binding name from the source text.
    pub name: String,
    /// Constructor name (e.g. `"Synth"`).
    pub kind: String,
    /// Epoch milliseconds at registration.
    pub created_at: i64,
}

/// A tracked repeating sequence driving one instrument parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: u64,
    /// Owning instrument — removal cascades.
    pub instrument_id: u64,
    /// The property/method being driven (e.g. `"note"`).
    pub target: String,
    pub values: Vec<serde_json::Value>,
    /// Beat durations between steps.
    pub timings: Vec<f64>,
    pub is_playing: bool,
}

/// Immutable point-in-time view of the composition. Safe to retain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionSnapshot {
    pub tempo_bpm: f64,
    pub instruments: Vec<Instrument>,
    pub sequences: Vec<Sequence>,
    /// Derived: any sequence currently playing.
    pub is_playing: bool,
    /// Epoch milliseconds at snapshot time.
    pub taken_at: i64,
}
