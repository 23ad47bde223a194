//! Bridge types describing the generated app's data model.
//!
//! Providers receive these instead of the planner's own types, so the
//! provider layer never depends on the pipeline.

use serde::{Deserialize, Serialize};

/// Where an entity's records live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StorageHint {
    Local,
    Cloud,
}

/// One named, typed property of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyRef {
    pub name: String,
    pub type_name: String,
    pub optional: bool,
}

impl PropertyRef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// One entity of the app's data model, with properties in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub name: String,
    pub storage: StorageHint,
    pub properties: Vec<PropertyRef>,
}

impl ModelRef {
    pub fn new(name: impl Into<String>, storage: StorageHint) -> Self {
        Self {
            name: name.into(),
            storage,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyRef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn is_cloud(&self) -> bool {
        self.storage == StorageHint::Cloud
    }

    /// Backend table name: snake_case, pluralized with a trailing `s`.
    pub fn table_name(&self) -> String {
        let snake = to_snake_case(&self.name);
        if snake.ends_with('s') {
            snake
        } else {
            format!("{snake}s")
        }
    }
}

pub(crate) fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_lower = true;
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}
