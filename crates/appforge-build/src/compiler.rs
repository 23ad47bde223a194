//! Toolchain-backed [`Compiler`].

use appforge_core::{BuildScope, Compiler, ForgeError, RawDiagnostic, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::parse::{parse_diagnostics, MAX_DIAGNOSTICS};
use crate::runner::{ProcessOutput, ProcessRunner};
use crate::stage::CommandSpec;

/// Unit named by a failure the parser could not locate.
pub const BUILD_UNIT: &str = "<build>";

/// Runs a build command and reports its error diagnostics.
///
/// The toolchain always builds the whole project; a scoped compile filters
/// the reported diagnostics down to the requested units.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    spec: CommandSpec,
    max_diagnostics: usize,
}

impl CommandCompiler {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            max_diagnostics: MAX_DIAGNOSTICS,
        }
    }

    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Diagnostics for one finished build, already scoped.
    fn diagnostics(&self, output: &ProcessOutput, scope: &BuildScope) -> Vec<RawDiagnostic> {
        let parsed = parse_diagnostics(
            &output.combined(),
            self.spec.working_dir.as_deref(),
            self.max_diagnostics,
        );

        if parsed.is_empty() && !output.passed() {
            let message = format!(
                "build failed with exit code {} and no located errors: {}",
                output.exit_code,
                output.last_line()
            );
            warn!(name = %output.name, exit_code = output.exit_code, "Build failed without parseable diagnostics");
            // Attribute an unlocated failure to whatever is in scope so the
            // loop never reads it as a clean build.
            return match scope {
                BuildScope::Full => vec![RawDiagnostic::new(BUILD_UNIT, message)],
                BuildScope::Units(units) => units
                    .iter()
                    .map(|unit| RawDiagnostic::new(unit.clone(), message.clone()))
                    .collect(),
            };
        }

        parsed.into_iter().filter(|d| scope.contains(&d.unit)).collect()
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, scope: &BuildScope) -> Result<Vec<RawDiagnostic>> {
        let output = ProcessRunner::execute(&self.spec)
            .await
            .map_err(|e| ForgeError::Collaborator(format!("{e:#}")))?;
        let diagnostics = self.diagnostics(&output, scope);
        debug!(
            name = %output.name,
            exit_code = output.exit_code,
            diagnostics = diagnostics.len(),
            duration_ms = output.duration_ms,
            "Compile finished"
        );
        Ok(diagnostics)
    }
}
