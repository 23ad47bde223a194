//! Domain models for AppForge.
//!
//! Canonical definitions shared by the provider registry, the build-fix loop
//! and the phase controller:
//! - `ForgeError`: error taxonomy
//! - `Diagnostic` / `Tier`: classified compiler output
//! - `ModelRef` / `PropertyRef`: data-model bridge handed to providers
//! - `Platform`, `Operation`, `AuthMethod`: closed hint vocabularies

pub mod diagnostic;
pub mod error;
pub mod hints;
pub mod model;

// Re-export main types and errors
pub use diagnostic::{Confidence, Diagnostic, RawDiagnostic, Tier};
pub use error::{ForgeError, Result};
pub use hints::{AuthMethod, Hints, Operation, Platform};
pub use model::{ModelRef, PropertyRef, StorageHint};
