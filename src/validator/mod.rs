/// `validator/` — pattern risk classifier for generated scripts
///
/// Scans raw source text against a fixed rule set before anything runs.
/// The classifier never errors and never executes code: the syntactic
/// pre-check compiles the chunk in a throwaway VM without calling it.
mod rules;

use mlua::Lua;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sandbox::surface::{EFFECT_KINDS, INSTRUMENT_KINDS};
use rules::{ALLOW_EXTRA_PATTERNS, DENY_RULES, GAIN_ASSIGNMENT_PATTERN, GAIN_LIMIT};

// ── Verdict types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The script must not run.
    Blocking,
    /// Worth surfacing, but execution may proceed.
    Advisory,
}

/// One itemized classifier hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    /// 1-based source line of the match, when one can be attributed.
    pub line: Option<u32>,
}

/// Result of classifying one candidate script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_acceptable: bool,
    pub findings: Vec<Finding>,
}

impl ValidationVerdict {
    fn from_findings(findings: Vec<Finding>) -> Self {
        let is_acceptable = !findings.iter().any(|f| f.severity == Severity::Blocking);
        Self {
            is_acceptable,
            findings,
        }
    }

    /// Messages of every Blocking finding, in rule order.
    pub fn blocking_messages(&self) -> Vec<&str> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Blocking)
            .map(|f| f.message.as_str())
            .collect()
    }
}

// ── Classifier ────────────────────────────────────────────────────────────────

/// Compiled rule tables. Build once, reuse for every candidate script.
pub struct Classifier {
    deny: Vec<(Regex, &'static str)>,
    allow: Vec<Regex>,
    gain: Regex,
    error_line: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        let deny = DENY_RULES
            .iter()
            .map(|(pattern, message)| {
                (
                    Regex::new(pattern).expect("denylist pattern must compile"),
                    *message,
                )
            })
            .collect();

        // Allowlist: known constructor calls plus sequencing/namespace shapes.
        let mut allow_patterns = vec![
            format!(r"\b(?:{})\s*\(", INSTRUMENT_KINDS.join("|")),
            format!(r"\b(?:{})\s*\(", EFFECT_KINDS.join("|")),
        ];
        allow_patterns.extend(ALLOW_EXTRA_PATTERNS.iter().map(|p| (*p).to_string()));
        let allow = allow_patterns
            .iter()
            .map(|p| Regex::new(p).expect("allowlist pattern must compile"))
            .collect();

        Self {
            deny,
            allow,
            gain: Regex::new(GAIN_ASSIGNMENT_PATTERN).expect("gain pattern must compile"),
            error_line: Regex::new(r"\]:(\d+):").expect("error line pattern must compile"),
        }
    }

    /// Classify `source`. Always returns a verdict; never panics or errors.
    pub fn classify(&self, source: &str) -> ValidationVerdict {
        let mut findings = Vec::new();

        if source.trim().is_empty() {
            findings.push(Finding {
                severity: Severity::Blocking,
                message: "empty source".to_string(),
                line: None,
            });
            return ValidationVerdict::from_findings(findings);
        }

        for (pattern, message) in &self.deny {
            if let Some(m) = pattern.find(source) {
                findings.push(Finding {
                    severity: Severity::Blocking,
                    message: (*message).to_string(),
                    line: Some(line_of(source, m.start())),
                });
            }
        }

        for captures in self.gain.captures_iter(source) {
            let value: f64 = captures[2].parse().unwrap_or(0.0);
            if value >= GAIN_LIMIT {
                let offset = captures.get(0).map(|m| m.start()).unwrap_or(0);
                findings.push(Finding {
                    severity: Severity::Blocking,
                    message: format!(
                        "excessive gain assignment: {} = {value} (limit {GAIN_LIMIT})",
                        &captures[1]
                    ),
                    line: Some(line_of(source, offset)),
                });
            }
        }

        if !self.allow.iter().any(|pattern| pattern.is_match(source)) {
            findings.push(Finding {
                severity: Severity::Advisory,
                message: "no domain-specific constructs found".to_string(),
                line: None,
            });
        }

        if let Some(finding) = self.syntax_check(source) {
            findings.push(finding);
        }

        ValidationVerdict::from_findings(findings)
    }

    /// Parse-without-execute: compile the chunk in a throwaway VM. The chunk
    /// is never called, so nothing the script declares can run here.
    fn syntax_check(&self, source: &str) -> Option<Finding> {
        let lua = Lua::new();
        match lua.load(source).into_function() {
            Ok(_) => None,
            Err(err) => {
                // mlua renders these as `syntax error: [string "..."]:N: ...`
                let message = err.to_string();
                let line = self
                    .error_line
                    .captures(&message)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok());
                Some(Finding {
                    severity: Severity::Blocking,
                    message,
                    line,
                })
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// 1-based line number of a byte offset.
fn line_of(source: &str, offset: usize) -> u32 {
    source[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}
