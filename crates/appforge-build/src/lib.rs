//! AppForge Build - process-backed collaborators
//!
//! Provides the external collaborators the pipeline drives:
//! - A compiler that runs a toolchain command and parses its diagnostics
//! - An agent adapter speaking JSON over stdin/stdout with an agent command

pub mod agent;
pub mod compiler;
pub mod error;
pub mod parse;
pub mod runner;
pub mod stage;

// Re-export key types
pub use agent::ProcessAgent;
pub use compiler::CommandCompiler;
pub use error::BuildError;
pub use parse::{parse_diagnostics, MAX_DIAGNOSTICS};
pub use runner::{ProcessOutput, ProcessRunner};
pub use stage::{CommandSpec, Toolchain};
