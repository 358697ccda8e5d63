/// `sandbox/vm.rs` — Lua VM restrictions per execution
///
/// Every run gets a fresh VM with a restricted set of standard libraries:
/// table, string, math, coroutine. Dangerous libraries (os, io, debug,
/// package) are never loaded, and the base-library escape hatches (load,
/// dofile, _G, ...) are scrubbed — the only way a script reaches the host
/// is through the capability surface bound into its globals.
use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Value};

/// Base-library globals removed from every VM. The base library itself is
/// always present (pairs, pcall, tostring, ...); these entries would reopen
/// dynamic evaluation, filesystem reads, or the raw global table.
const SCRUBBED_GLOBALS: &[&str] = &[
    "load",
    "loadstring",
    "dofile",
    "loadfile",
    "collectgarbage",
    "rawset",
    "_G",
];

/// Creates a new Lua VM with sandbox restrictions applied.
pub fn create_sandboxed_vm() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    let globals = lua.globals();
    for name in SCRUBBED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }
    drop(globals);

    Ok(lua)
}
