//! Tier classification of raw compiler diagnostics.

use std::collections::HashMap;

use crate::config::ForgeConfig;
use crate::domain::{Confidence, Diagnostic, RawDiagnostic, Tier};

const STRUCTURAL: &[&str] = &[
    "expected declaration",
    "expected '}'",
    "expected expression",
    "extraneous",
    "unterminated",
    "unexpected end of file",
    "missing top-level",
    "consecutive statements on a line",
];

const CONFORMANCE: &[&str] = &[
    "does not conform",
    "not all trait items implemented",
    "protocol requires",
    "missing required",
];

const MISSING_ARGUMENTS: &[&str] = &[
    "missing argument",
    "extra argument",
    "incorrect argument label",
    "this function takes",
    "argument passed to call that takes no arguments",
];

const SCOPE: &[&str] = &[
    "cannot find",
    "not found in scope",
    "not found in this scope",
    "unresolved",
    "use of undeclared",
    "no such module",
    "has no member",
    "not found",
];

const TYPE_MISMATCH: &[&str] = &[
    "cannot convert value",
    "mismatched types",
    "cannot assign value of type",
    "type mismatch",
];

/// Assigns each diagnostic a tier from its message and its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    window: u32,
    threshold: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&ForgeConfig::default())
    }
}

impl Classifier {
    pub fn new(window: u32, threshold: usize) -> Self {
        Self { window, threshold }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.structural_window, config.structural_threshold)
    }

    /// Tier from message text alone. Unmatched messages fall back to
    /// `TypeMismatch` with heuristic confidence.
    pub fn tier_of(message: &str) -> (Tier, Confidence) {
        let msg = message.to_lowercase();
        let table: [(Tier, &[&str]); 5] = [
            (Tier::Structural, STRUCTURAL),
            (Tier::Conformance, CONFORMANCE),
            (Tier::MissingArguments, MISSING_ARGUMENTS),
            (Tier::Scope, SCOPE),
            (Tier::TypeMismatch, TYPE_MISMATCH),
        ];
        table
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| msg.contains(p)))
            .map(|(tier, _)| (*tier, Confidence::Explicit))
            .unwrap_or((Tier::TypeMismatch, Confidence::Heuristic))
    }

    /// Classify a batch.
    ///
    /// A unit with at least `threshold` scope diagnostics in its first
    /// `window` lines is treated as structurally broken: all of its
    /// diagnostics are promoted to `Structural` with heuristic confidence.
    pub fn classify(&self, raw: Vec<RawDiagnostic>) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = raw
            .into_iter()
            .map(|r| {
                let (tier, confidence) = Self::tier_of(&r.message);
                Diagnostic::classified(r, tier, confidence)
            })
            .collect();

        let mut early_scope: HashMap<&str, usize> = HashMap::new();
        for d in &diagnostics {
            if d.tier == Tier::Scope && d.line.is_some_and(|l| l <= self.window) {
                *early_scope.entry(d.unit.as_str()).or_default() += 1;
            }
        }
        let broken: Vec<String> = early_scope
            .into_iter()
            .filter(|(_, count)| *count >= self.threshold)
            .map(|(unit, _)| unit.to_string())
            .collect();

        if !broken.is_empty() {
            for d in diagnostics.iter_mut().filter(|d| broken.contains(&d.unit)) {
                if d.tier != Tier::Structural {
                    d.tier = Tier::Structural;
                    d.confidence = Confidence::Heuristic;
                }
            }
        }
        diagnostics
    }
}
