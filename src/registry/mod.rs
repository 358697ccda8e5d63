/// `registry/` — the composition registry
///
/// In-memory store of the instruments and sequences created by accepted
/// scripts — "what is currently playing". The subscribe/snapshot contract is
/// the entire surface a presentation layer may consume; mutation happens only
/// through the documented operations.
pub mod events;
pub mod store;
pub mod types;

pub use events::RegistryEvent;
pub use store::{CompositionRegistry, Subscription, DEFAULT_TEMPO_BPM};
pub use types::{CompositionSnapshot, Instrument, Sequence};
