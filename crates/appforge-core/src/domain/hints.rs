//! Closed hint vocabularies exchanged with the reasoning agent.
//!
//! Every field is a closed enum: a value outside the listed variants fails
//! deserialization, which callers report as a contract violation.

use serde::{Deserialize, Serialize};

/// Target platform of the generated application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Ipados,
    Macos,
    Watchos,
    Tvos,
    Visionos,
}

impl Platform {
    pub fn all() -> &'static [Platform] {
        &[
            Platform::Ios,
            Platform::Ipados,
            Platform::Macos,
            Platform::Watchos,
            Platform::Tvos,
            Platform::Visionos,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Ipados => "ipados",
            Platform::Macos => "macos",
            Platform::Watchos => "watchos",
            Platform::Tvos => "tvos",
            Platform::Visionos => "visionos",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the request asks the generator to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Edit,
    Fix,
}

/// Sign-in method requested for the generated app.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Email,
    Apple,
    Google,
    Anonymous,
}

impl AuthMethod {
    /// Methods that need provider-side configuration outside the database.
    pub fn needs_platform_setup(&self) -> bool {
        matches!(self, AuthMethod::Apple | AuthMethod::Google)
    }
}

/// Caller-supplied hints that short-circuit routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}
