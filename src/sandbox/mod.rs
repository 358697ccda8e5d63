/// `sandbox/` — the sandboxed execution core
///
/// Each candidate script runs in its own freshly built Lua VM (mlua) with
/// only the capability surface bound into its globals, raced against a hard
/// deadline. Script failures are classified and returned as data — they
/// never crash the host.
pub mod executor;
pub mod extract;
pub mod surface;
pub mod vm;
