//! Compiler diagnostics as consumed by the build-fix loop.

use serde::{Deserialize, Serialize};

/// Fix priority class. Declaration order is priority order: fixing an earlier
/// tier frequently resolves or reshapes diagnostics in later tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// The unit is malformed; regenerate rather than patch.
    Structural,
    /// A declared protocol/capability is not fully satisfied.
    Conformance,
    /// Call sites out of sync with a signature.
    MissingArguments,
    /// A referenced name cannot be resolved.
    Scope,
    /// Value/type incompatibility, usually a downstream symptom.
    TypeMismatch,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[
            Tier::Structural,
            Tier::Conformance,
            Tier::MissingArguments,
            Tier::Scope,
            Tier::TypeMismatch,
        ]
    }

    /// 1-based tier number.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Structural => 1,
            Tier::Conformance => 2,
            Tier::MissingArguments => 3,
            Tier::Scope => 4,
            Tier::TypeMismatch => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Structural => "structural",
            Tier::Conformance => "conformance",
            Tier::MissingArguments => "missing_arguments",
            Tier::Scope => "scope",
            Tier::TypeMismatch => "type_mismatch",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the tier was assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Inferred from surrounding diagnostics or a fallback rule.
    Heuristic,
    /// The message itself matched a tier pattern.
    Explicit,
}

/// A diagnostic as reported by the compiler, before classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDiagnostic {
    /// Unit (source file) the complaint is about.
    pub unit: String,

    /// Line number (1-indexed).
    pub line: Option<u32>,

    /// Column number (1-indexed).
    pub column: Option<u32>,

    /// Compiler message.
    pub message: String,
}

impl RawDiagnostic {
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Set file location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// A classified diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub unit: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
    pub tier: Tier,
    pub confidence: Confidence,
}

impl Diagnostic {
    pub fn classified(raw: RawDiagnostic, tier: Tier, confidence: Confidence) -> Self {
        Self {
            unit: raw.unit,
            line: raw.line,
            column: raw.column,
            message: raw.message,
            tier,
            confidence,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{}:{}:{}: {}", self.unit, line, col, self.message),
            (Some(line), None) => write!(f, "{}:{}: {}", self.unit, line, self.message),
            _ => write!(f, "{}: {}", self.unit, self.message),
        }
    }
}
