/// `sandbox/surface.rs` — capability surface bound into each script VM
///
/// Installs the full script-facing API: instrument/effect constructors, the
/// `audio` namespace, and `log`. The table is rebuilt per execution from the
/// current runtime handle and holds no state of its own. Nothing here grants
/// ambient host access — every binding forwards to the runtime traits.
use std::sync::{Arc, Mutex};

use mlua::{Lua, MetaMethod, Result as LuaResult, Table, UserData, UserDataMethods, Value, Variadic};

use crate::runtime::{EffectNode, InstrumentNode, RuntimeHandle};

/// Instrument constructor names exposed to scripts.
pub const INSTRUMENT_KINDS: &[&str] = &["Synth", "FmSynth", "PluckSynth", "MembraneSynth", "NoiseSynth"];

/// Effect constructor names exposed to scripts.
pub const EFFECT_KINDS: &[&str] = &["Reverb", "Delay", "Distortion"];

/// Per-run script output (log.info / log.warn / log.error calls).
#[derive(Debug, Clone)]
pub struct ScriptLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: i64,
}

pub type ScriptLog = Arc<Mutex<Vec<ScriptLogEntry>>>;

/// Install the full capability surface on `lua`.
///
/// `sink` — entries written by log.info/warn/error land here.
pub fn install(lua: &Lua, runtime: &Arc<dyn RuntimeHandle>, sink: &ScriptLog) -> LuaResult<()> {
    register_log(lua, Arc::clone(sink))?;
    register_instruments(lua, runtime)?;
    register_effects(lua, runtime)?;
    register_audio(lua, Arc::clone(runtime))?;
    Ok(())
}

// ── log ───────────────────────────────────────────────────────────────────────

fn register_log(lua: &Lua, sink: ScriptLog) -> LuaResult<()> {
    let log_tbl = lua.create_table()?;

    macro_rules! log_fn {
        ($level:literal) => {{
            let sink = Arc::clone(&sink);
            lua.create_function(move |_, msg: String| {
                let entry = ScriptLogEntry {
                    level: $level.to_string(),
                    message: msg.clone(),
                    timestamp: chrono::Utc::now().timestamp(),
                };
                log::info!("[script][{}] {}", $level, msg);
                sink.lock().unwrap().push(entry);
                Ok(())
            })?
        }};
    }

    log_tbl.set("info", log_fn!("info"))?;
    log_tbl.set("warn", log_fn!("warn"))?;
    log_tbl.set("error", log_fn!("error"))?;
    lua.globals().set("log", log_tbl)?;
    Ok(())
}

// ── Instrument constructors ───────────────────────────────────────────────────

/// Userdata wrapper around a live instrument voice.
///
/// Property assignment forwards to `set_param`; property access yields a
/// callable proxy, so `s.note(60)` triggers once and `s.note.seq({..}, {..})`
/// schedules a repeating sequence on the node.
struct InstrumentBinding {
    node: Arc<dyn InstrumentNode>,
}

impl UserData for InstrumentBinding {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::NewIndex, |_, this, (key, value): (String, Value)| {
            this.node.set_param(&key, lua_value_to_json(value));
            Ok(())
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            param_proxy(lua, Arc::clone(&this.node), key)
        });
    }
}

/// Build the callable proxy returned by `instrument.<param>`.
fn param_proxy(lua: &Lua, node: Arc<dyn InstrumentNode>, param: String) -> LuaResult<Table> {
    let proxy = lua.create_table()?;

    let seq = {
        let node = Arc::clone(&node);
        let target = param.clone();
        lua.create_function(move |_, (values, timings): (Table, Option<Table>)| {
            let values = table_to_values(values);
            let timings = timings.map(table_to_timings).unwrap_or_default();
            node.schedule(&target, &values, &timings);
            Ok(())
        })?
    };
    proxy.set("seq", seq)?;

    let metatable = lua.create_table()?;
    let call = lua.create_function(move |_, (_proxy, value): (Value, Value)| {
        node.trigger(&param, lua_value_to_json(value));
        Ok(())
    })?;
    metatable.set("__call", call)?;
    proxy.set_metatable(Some(metatable));

    Ok(proxy)
}

fn register_instruments(lua: &Lua, runtime: &Arc<dyn RuntimeHandle>) -> LuaResult<()> {
    for kind in INSTRUMENT_KINDS {
        let runtime = Arc::clone(runtime);
        let ctor = lua.create_function(move |_, args: Variadic<Value>| {
            let node = runtime.create_instrument(kind).map_err(mlua::Error::external)?;
            // An optional leading table seeds parameters: Synth({ gain = 0.5 })
            if let Some(Value::Table(init)) = args.into_iter().next() {
                for pair in init.pairs::<String, Value>() {
                    if let Ok((name, value)) = pair {
                        node.set_param(&name, lua_value_to_json(value));
                    }
                }
            }
            Ok(InstrumentBinding { node })
        })?;
        lua.globals().set(*kind, ctor)?;
    }
    Ok(())
}

// ── Effect constructors ───────────────────────────────────────────────────────

struct EffectBinding {
    node: Arc<dyn EffectNode>,
}

impl UserData for EffectBinding {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::NewIndex, |_, this, (key, value): (String, Value)| {
            this.node.set_param(&key, lua_value_to_json(value));
            Ok(())
        });
    }
}

fn register_effects(lua: &Lua, runtime: &Arc<dyn RuntimeHandle>) -> LuaResult<()> {
    for kind in EFFECT_KINDS {
        let runtime = Arc::clone(runtime);
        let ctor = lua.create_function(move |_, _: Variadic<Value>| {
            let node = runtime.create_effect(kind).map_err(mlua::Error::external)?;
            Ok(EffectBinding { node })
        })?;
        lua.globals().set(*kind, ctor)?;
    }
    Ok(())
}

// ── audio namespace ───────────────────────────────────────────────────────────

/// `audio.bpm` reads and writes the transport tempo; no other field resolves.
fn register_audio(lua: &Lua, runtime: Arc<dyn RuntimeHandle>) -> LuaResult<()> {
    let tbl = lua.create_table()?;
    let metatable = lua.create_table()?;

    {
        let runtime = Arc::clone(&runtime);
        let index = lua.create_function(move |_, (_tbl, key): (Table, String)| {
            match key.as_str() {
                "bpm" | "tempo" => Ok(Value::Number(runtime.tempo())),
                _ => Ok(Value::Nil),
            }
        })?;
        metatable.set("__index", index)?;
    }

    let newindex = lua.create_function(move |_, (_tbl, key, value): (Table, String, f64)| {
        match key.as_str() {
            "bpm" | "tempo" => {
                runtime.set_tempo(value);
                Ok(())
            }
            _ => Err(mlua::Error::RuntimeError(format!(
                "unknown audio property `{key}`"
            ))),
        }
    })?;
    metatable.set("__newindex", newindex)?;

    tbl.set_metatable(Some(metatable));
    lua.globals().set("audio", tbl)?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub(crate) fn lua_value_to_json(val: Value) -> serde_json::Value {
    match val {
        Value::Nil => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Integer(i) => serde_json::json!(i),
        Value::Number(n) => serde_json::json!(n),
        Value::String(s) => serde_json::Value::String(s.to_string_lossy()),
        Value::Table(t) => {
            // Array heuristic: sequential integer keys from 1
            let pairs: Vec<_> = t.pairs::<Value, Value>().filter_map(|p| p.ok()).collect();
            let is_array = pairs
                .iter()
                .enumerate()
                .all(|(i, (k, _))| matches!(k, Value::Integer(n) if *n == (i as i64 + 1)));
            if is_array {
                serde_json::Value::Array(pairs.into_iter().map(|(_, v)| lua_value_to_json(v)).collect())
            } else {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    if let Value::String(ks) = k {
                        map.insert(ks.to_string_lossy(), lua_value_to_json(v));
                    }
                }
                serde_json::Value::Object(map)
            }
        }
        _ => serde_json::Value::Null,
    }
}

fn table_to_values(table: Table) -> Vec<serde_json::Value> {
    table
        .sequence_values::<Value>()
        .filter_map(|v| v.ok())
        .map(lua_value_to_json)
        .collect()
}

fn table_to_timings(table: Table) -> Vec<f64> {
    table
        .sequence_values::<Value>()
        .filter_map(|v| v.ok())
        .filter_map(|v| match v {
            Value::Integer(i) => Some(i as f64),
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::stub::StubRuntime;
    use crate::sandbox::vm::create_sandboxed_vm;

    fn surface_vm() -> (Lua, Arc<StubRuntime>, ScriptLog) {
        let lua = create_sandboxed_vm().unwrap();
        let stub = StubRuntime::new();
        let runtime: Arc<dyn RuntimeHandle> = stub.clone();
        let sink: ScriptLog = Arc::new(Mutex::new(Vec::new()));
        install(&lua, &runtime, &sink).unwrap();
        (lua, stub, sink)
    }

    #[test]
    fn constructors_reach_the_runtime() {
        let (lua, stub, _) = surface_vm();
        lua.load("local s = Synth()\nlocal r = Reverb()").exec().unwrap();
        assert_eq!(stub.created_kinds(), vec!["Synth", "Reverb"]);
    }

    #[test]
    fn constructor_table_argument_seeds_params() {
        let (lua, stub, _) = surface_vm();
        lua.load("local s = Synth({ gain = 0.5 })").exec().unwrap();
        assert_eq!(stub.created_kinds(), vec!["Synth"]);
        // create + one set_param
        assert_eq!(stub.invocation_count(), 2);
    }

    #[test]
    fn param_assignment_and_trigger_and_seq() {
        let (lua, stub, _) = surface_vm();
        lua.load(
            "local bass = Synth()\n\
             bass.gain = 0.8\n\
             bass.note(60)\n\
             bass.note.seq({60, 62, 64}, {0.5, 0.5, 1})",
        )
        .exec()
        .unwrap();
        // create + set_param + trigger + schedule
        assert_eq!(stub.invocation_count(), 4);
    }

    #[test]
    fn audio_namespace_drives_tempo() {
        let (lua, stub, _) = surface_vm();
        lua.load("audio.bpm = 140").exec().unwrap();
        assert!((stub.tempo() - 140.0).abs() < f64::EPSILON);
        let bpm: f64 = lua.load("return audio.bpm").eval().unwrap();
        assert!((bpm - 140.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_audio_property_raises() {
        let (lua, _, _) = surface_vm();
        assert!(lua.load("audio.volume = 1").exec().is_err());
    }

    #[test]
    fn log_calls_land_in_the_sink() {
        let (lua, _, sink) = surface_vm();
        lua.load("log.info(\"hello\")\nlog.warn(\"careful\")").exec().unwrap();
        let entries = sink.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, "info");
        assert_eq!(entries[0].message, "hello");
        assert_eq!(entries[1].level, "warn");
    }

    #[test]
    fn no_ambient_globals_leak_through() {
        let (lua, _, _) = surface_vm();
        for name in ["os", "io", "require", "load", "_G"] {
            let value: Value = lua.globals().get(name).unwrap();
            assert!(matches!(value, Value::Nil), "`{name}` must stay nil");
        }
    }

    #[test]
    fn lua_values_convert_to_json() {
        let (lua, _, _) = surface_vm();
        let value: Value = lua
            .load("return { 1, 2.5, \"three\", { nested = true } }")
            .eval()
            .unwrap();
        let json = lua_value_to_json(value);
        assert_eq!(json[0], 1);
        assert_eq!(json[1], 2.5);
        assert_eq!(json[2], "three");
        assert_eq!(json[3]["nested"], true);
    }
}
