/// `runtime/` — external audio runtime boundary
///
/// The synthesis engine itself is an external collaborator; the core only
/// sees the `RuntimeHandle` trait (named constructors plus a tempo field).
/// `RuntimeManager` owns async, idempotent loading of the handle — concurrent
/// initializers coalesce onto a single in-flight attempt instead of racing
/// to double-initialize.
pub mod stub;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::SandboxError;

/// A live instrument voice owned by the audio runtime.
///
/// The core never copies the underlying object — it holds `Arc` references
/// handed out by [`RuntimeHandle::create_instrument`].
pub trait InstrumentNode: Send + Sync {
    /// Constructor name this node was built from (e.g. `"Synth"`).
    fn kind(&self) -> &str;

    /// Assign a parameter (`gain`, `frequency`, ...).
    fn set_param(&self, name: &str, value: serde_json::Value);

    /// Fire a parameter once (e.g. play a note).
    fn trigger(&self, param: &str, value: serde_json::Value);

    /// Schedule a repeating sequence driving `target` with `values` spaced
    /// by `timings` beat durations.
    fn schedule(&self, target: &str, values: &[serde_json::Value], timings: &[f64]);
}

/// A live effect unit owned by the audio runtime.
pub trait EffectNode: Send + Sync {
    fn kind(&self) -> &str;
    fn set_param(&self, name: &str, value: serde_json::Value);
}

/// Opaque capability handle supplied by the audio/graphics collaborator.
///
/// Exposes named constructors and the transport tempo — nothing else. The
/// capability surface binds these into each script VM; no ambient host
/// access flows through here.
pub trait RuntimeHandle: Send + Sync {
    fn create_instrument(&self, kind: &str) -> Result<Arc<dyn InstrumentNode>, SandboxError>;
    fn create_effect(&self, kind: &str) -> Result<Arc<dyn EffectNode>, SandboxError>;
    fn set_tempo(&self, bpm: f64);
    fn tempo(&self) -> f64;
}

// ── RuntimeManager ────────────────────────────────────────────────────────────

/// Shared, cloneable owner of the runtime handle lifecycle.
///
/// The handle loads asynchronously and exactly once: a second `initialize`
/// call while the first is still in flight awaits the same attempt, and a
/// call after success returns the existing handle untouched.
#[derive(Clone, Default)]
pub struct RuntimeManager {
    cell: Arc<OnceCell<Arc<dyn RuntimeHandle>>>,
}

impl RuntimeManager {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Load the runtime handle through `load`, coalescing concurrent callers.
    pub async fn initialize<F, Fut>(&self, load: F) -> Result<Arc<dyn RuntimeHandle>, SandboxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn RuntimeHandle>, SandboxError>>,
    {
        let handle = self.cell.get_or_try_init(load).await?;
        Ok(Arc::clone(handle))
    }

    /// The live handle, or `None` until initialization has completed.
    pub fn handle(&self) -> Option<Arc<dyn RuntimeHandle>> {
        self.cell.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::stub::StubRuntime;
    use super::*;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let manager = RuntimeManager::new();
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            let result = manager
                .initialize(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    let handle: Arc<dyn RuntimeHandle> = StubRuntime::new();
                    Ok(handle)
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1, "loader must run exactly once");
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn concurrent_initializers_coalesce() {
        let manager = RuntimeManager::new();
        let loads = Arc::new(AtomicU32::new(0));

        let loader = |loads: Arc<AtomicU32>| async move {
            loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let handle: Arc<dyn RuntimeHandle> = StubRuntime::new();
            Ok(handle)
        };

        let (a, b) = tokio::join!(
            manager.initialize(|| loader(Arc::clone(&loads))),
            manager.initialize(|| loader(Arc::clone(&loads))),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(
            loads.load(Ordering::SeqCst),
            1,
            "both callers must join the same in-flight attempt"
        );
    }

    #[tokio::test]
    async fn handle_is_none_before_initialization() {
        let manager = RuntimeManager::new();
        assert!(manager.handle().is_none());
        assert!(!manager.is_ready());
    }
}
