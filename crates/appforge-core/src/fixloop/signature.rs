//! Stable fingerprint of a targeted diagnostic set, used for cycle detection.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::Diagnostic;

/// SHA-256 hex over the normalized `(unit, tier, message)` triples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Order-insensitive; ignores line/column numbers, case and whitespace runs.
    pub fn of<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> Self {
        let mut lines: Vec<String> = diagnostics
            .into_iter()
            .map(|d| format!("{}|{}|{}", d.unit, d.tier.as_str(), normalize(&d.message)))
            .collect();
        lines.sort();
        lines.dedup();

        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Signature(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:line|col(?:umn)?)\s*\d+|:\d+(?::\d+)?").expect("valid location regex")
    })
}

/// Lowercase, strip line/column references, collapse whitespace.
pub(crate) fn normalize(message: &str) -> String {
    let lowered = message.to_lowercase();
    let stripped = location_re().replace_all(&lowered, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Confidence, RawDiagnostic, Tier};

    fn diag(unit: &str, msg: &str, line: u32) -> Diagnostic {
        Diagnostic::classified(
            RawDiagnostic::new(unit, msg).at(line, 4),
            Tier::Scope,
            Confidence::Explicit,
        )
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("Cannot  find 'Foo'\tin scope (line 12, column 3)"),
            "cannot find 'foo' in scope ( , )"
        );
        assert_eq!(normalize("at App.swift:10:2 here"), "at app.swift here");
    }

    #[test]
    fn test_signature_ignores_order_and_location() {
        let a = Signature::of(&[diag("A", "cannot find 'X'", 1), diag("B", "cannot find 'Y'", 2)]);
        let b = Signature::of(&[diag("B", "Cannot find 'Y'", 9), diag("A", "cannot find 'X'", 7)]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_signature_distinguishes_units() {
        let a = Signature::of(&[diag("A", "cannot find 'X'", 1)]);
        let b = Signature::of(&[diag("B", "cannot find 'X'", 1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_form_of_foreign_signature() {
        let sig: Signature = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(sig.short(), "abc");

        let full = Signature::of(&[diag("A", "cannot find 'X'", 1)]);
        assert_eq!(full.short().len(), 12);
    }
}
