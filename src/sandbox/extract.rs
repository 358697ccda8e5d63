/// `sandbox/extract.rs` — best-effort source scans for composition tracking
///
/// The sandbox does not introspect VM bindings, so after a successful run the
/// original source text is re-scanned for `name = Constructor(...)`
/// declarations and `name.target.seq(...)` invocations. Extraction is
/// metadata only: shapes that don't match are skipped silently, and a script
/// that builds an instrument through a helper function will not be tracked.
use regex::Regex;

use super::surface::INSTRUMENT_KINDS;

/// A `name = Constructor(...)` declaration lifted from source text.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentDecl {
    pub name: String,
    pub kind: String,
}

/// A `name.target.seq({values}, {timings})` invocation lifted from source text.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDecl {
    pub instrument: String,
    pub target: String,
    pub values: Vec<serde_json::Value>,
    pub timings: Vec<f64>,
}

/// Compiled scan patterns. Build once, reuse per execution.
pub struct SourceScanner {
    decl: Regex,
    seq: Regex,
}

impl SourceScanner {
    pub fn new() -> Self {
        let constructors = INSTRUMENT_KINDS.join("|");
        let decl = Regex::new(&format!(
            r"(?m)^\s*(?:local\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*({constructors})\s*\("
        ))
        .expect("declaration pattern must compile");
        let seq = Regex::new(
            r"([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\.seq\s*\(\s*\{([^}]*)\}\s*(?:,\s*\{([^}]*)\})?",
        )
        .expect("sequence pattern must compile");
        Self { decl, seq }
    }

    /// Instrument declarations in source order.
    pub fn instruments(&self, source: &str) -> Vec<InstrumentDecl> {
        self.decl
            .captures_iter(source)
            .map(|c| InstrumentDecl {
                name: c[1].to_string(),
                kind: c[2].to_string(),
            })
            .collect()
    }

    /// Sequence invocations in source order, with their first two table
    /// arguments parsed best-effort.
    pub fn sequences(&self, source: &str) -> Vec<SequenceDecl> {
        self.seq
            .captures_iter(source)
            .map(|c| SequenceDecl {
                instrument: c[1].to_string(),
                target: c[2].to_string(),
                values: parse_values(c.get(3).map_or("", |m| m.as_str())),
                timings: parse_timings(c.get(4).map_or("", |m| m.as_str())),
            })
            .collect()
    }
}

impl Default for SourceScanner {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Comma-separated literals → opaque JSON values. Numbers parse as numbers,
/// quoted strings lose their quotes, anything else is kept as raw text.
fn parse_values(body: &str) -> Vec<serde_json::Value> {
    body.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|token| {
            if let Ok(i) = token.parse::<i64>() {
                serde_json::json!(i)
            } else if let Ok(f) = token.parse::<f64>() {
                serde_json::json!(f)
            } else {
                serde_json::Value::String(token.trim_matches(|c| c == '"' || c == '\'').to_string())
            }
        })
        .collect()
}

/// Comma-separated beat durations; non-numeric tokens are dropped.
fn parse_timings(body: &str) -> Vec<f64> {
    body.split(',')
        .map(str::trim)
        .filter_map(|t| t.parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_declarations_with_and_without_local() {
        let scanner = SourceScanner::new();
        let source = "local bass = Synth()\nlead = FmSynth({ gain = 0.5 })";
        let decls = scanner.instruments(source);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0], InstrumentDecl { name: "bass".into(), kind: "Synth".into() });
        assert_eq!(decls[1], InstrumentDecl { name: "lead".into(), kind: "FmSynth".into() });
    }

    #[test]
    fn ignores_unknown_constructors_and_non_declarations() {
        let scanner = SourceScanner::new();
        assert!(scanner.instruments("local x = Mixer()").is_empty());
        assert!(scanner.instruments("Synth()").is_empty(), "bare call has no binding name");
    }

    #[test]
    fn finds_sequences_with_values_and_timings() {
        let scanner = SourceScanner::new();
        let seqs = scanner.sequences("bass.note.seq({60, 62, 64}, {0.5, 0.5, 1})");
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].instrument, "bass");
        assert_eq!(seqs[0].target, "note");
        assert_eq!(
            seqs[0].values,
            vec![serde_json::json!(60), serde_json::json!(62), serde_json::json!(64)]
        );
        assert_eq!(seqs[0].timings, vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn sequence_without_timings_parses_empty() {
        let scanner = SourceScanner::new();
        let seqs = scanner.sequences("lead.freq.seq({220, 440})");
        assert_eq!(seqs.len(), 1);
        assert!(seqs[0].timings.is_empty());
    }

    #[test]
    fn string_values_lose_their_quotes() {
        let scanner = SourceScanner::new();
        let seqs = scanner.sequences("drums.pattern.seq({\"x\", \"o\"}, {0.25, 0.25})");
        assert_eq!(
            seqs[0].values,
            vec![serde_json::json!("x"), serde_json::json!("o")]
        );
    }

    #[test]
    fn unmatched_shapes_are_skipped_silently() {
        let scanner = SourceScanner::new();
        // seq through a helper variable — inherently untrackable
        assert!(scanner.sequences("play(bass, {60})").is_empty());
        assert!(scanner.sequences("bass.note.seq(values, timings)").is_empty());
    }
}
