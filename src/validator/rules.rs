/// `validator/rules.rs` — static pattern tables
///
/// Plain data: ordered `(pattern, message)` tuples evaluated independently.
/// Patterns target the Lua surface exposed to generated scripts. This is a
/// heuristic gate — a variable that merely looks like a blocked token will
/// trip it, and an unrecognized dangerous construct will not. Both are
/// accepted trade-offs; the hard wall is the execution deadline.

/// Denylist — any match yields a Blocking finding.
pub(crate) const DENY_RULES: &[(&str, &str)] = &[
    // Unbounded loop constructs
    (r"while\s+true\s+do", "unbounded loop: `while true do`"),
    (r"while\s*\(\s*true\s*\)", "unbounded loop: `while (true)`"),
    (r"\buntil\s+false\b", "unbounded loop: `repeat ... until false`"),
    // Dynamic code evaluation
    (r"\bload\s*\(", "dynamic code evaluation: `load`"),
    (r"\bloadstring\s*\(", "dynamic code evaluation: `loadstring`"),
    (r"\bdofile\s*\(", "dynamic code evaluation: `dofile`"),
    // Dynamic module loading
    (r"\brequire\b", "dynamic module loading: `require`"),
    // Host process / filesystem surfaces
    (r"\bos\s*\.", "host process access: `os.*`"),
    (r"\bio\s*\.", "filesystem access: `io.*`"),
    (r"\bpackage\s*\.", "module system access: `package.*`"),
    // VM introspection and environment escape
    (r"\bdebug\s*\.", "VM introspection: `debug.*`"),
    (r"\b_G\b", "global environment escape: `_G`"),
    (r"\bgetfenv\s*\(|\bsetfenv\s*\(", "environment manipulation: `getfenv`/`setfenv`"),
    (r"\brawset\s*\(", "raw table mutation: `rawset`"),
    // Network surfaces
    (r"\bsocket\s*\.", "network access: `socket.*`"),
];

/// Gain-like property assignments are blocked above this value.
pub(crate) const GAIN_LIMIT: f64 = 10.0;

/// Matches `x.gain = <number>` shapes; the numeric comparison against
/// [`GAIN_LIMIT`] happens in the classifier, not in the pattern.
pub(crate) const GAIN_ASSIGNMENT_PATTERN: &str =
    r"[.:]\s*(gain|amp|amplitude|volume)\s*=\s*([0-9]+(?:\.[0-9]+)?)";

/// Allowlist extras beyond the constructor vocabulary: sequencing calls and
/// the runtime namespace. Absence of every allowlist match is Advisory only.
pub(crate) const ALLOW_EXTRA_PATTERNS: &[&str] = &[r"\.seq\s*\(", r"\baudio\s*\."];
