/// `state.rs` — per-application context
///
/// One `AppState` per embedding application instance; no module-level
/// globals. Every operation reaches the runtime, registry and executor
/// through this context (or a clone of one of its handles).
use std::future::Future;
use std::sync::Arc;

use crate::error::SandboxError;
use crate::registry::CompositionRegistry;
use crate::runtime::{RuntimeHandle, RuntimeManager};
use crate::sandbox::executor::ScriptExecutor;

pub struct AppState {
    pub runtime: RuntimeManager,
    pub registry: CompositionRegistry,
    pub executor: ScriptExecutor,
}

impl AppState {
    pub fn new() -> Self {
        let runtime = RuntimeManager::new();
        let registry = CompositionRegistry::new();
        let executor = ScriptExecutor::new(runtime.clone(), registry.clone());
        Self {
            runtime,
            registry,
            executor,
        }
    }

    /// Load the runtime handle (coalescing concurrent callers) and wire it
    /// into the registry so tempo changes propagate.
    pub async fn initialize<F, Fut>(&self, load: F) -> Result<Arc<dyn RuntimeHandle>, SandboxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn RuntimeHandle>, SandboxError>>,
    {
        let handle = self.runtime.initialize(load).await?;
        self.registry.attach_runtime(Arc::clone(&handle));
        Ok(handle)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
