//! The tiered build-fix loop.
//!
//! Each iteration compiles, classifies, picks the lowest (highest-priority)
//! tier present and fixes only that tier across the affected units. The loop
//! stops on a clean build, after `max_iterations` compiles, when a targeted
//! diagnostic set repeats after a fix, or when a collaborator stays down.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classify::Classifier;
use super::signature::Signature;
use crate::config::ForgeConfig;
use crate::domain::{Diagnostic, RawDiagnostic, Result, Tier};
use crate::obs;

/// Which units a compile (and the loop's attention) covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "units")]
pub enum BuildScope {
    Full,
    Units(BTreeSet<String>),
}

impl BuildScope {
    pub fn contains(&self, unit: &str) -> bool {
        match self {
            BuildScope::Full => true,
            BuildScope::Units(units) => units.contains(unit),
        }
    }
}

/// Compiles the artifact and reports raw diagnostics. An empty list is success.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, scope: &BuildScope) -> Result<Vec<RawDiagnostic>>;
}

/// Applies one fix action to the artifact.
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn apply_fix(&self, action: &FixAction) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategy {
    /// Rewrite the unit from scratch.
    Regenerate,
    /// Targeted edit of the reported locations.
    Patch,
}

impl FixStrategy {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Structural => FixStrategy::Regenerate,
            _ => FixStrategy::Patch,
        }
    }
}

/// Diagnostics to fix in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFix {
    pub unit: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// One tier's worth of fixes, handed to the [`Fixer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAction {
    pub iteration: u32,
    pub tier: Tier,
    pub strategy: FixStrategy,
    pub units: Vec<UnitFix>,
}

impl FixAction {
    /// Group diagnostics by unit, in unit order.
    pub fn new(iteration: u32, tier: Tier, diagnostics: Vec<Diagnostic>) -> Self {
        let mut grouped: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
        for d in diagnostics {
            grouped.entry(d.unit.clone()).or_default().push(d);
        }
        Self {
            iteration,
            tier,
            strategy: FixStrategy::for_tier(tier),
            units: grouped
                .into_iter()
                .map(|(unit, diagnostics)| UnitFix { unit, diagnostics })
                .collect(),
        }
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.unit.as_str()).collect()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.units.iter().map(|u| u.diagnostics.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixMode {
    /// Whole artifact.
    Full,
    /// Restricted to a named subset of units.
    Recovery,
}

impl FixMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixMode::Full => "full",
            FixMode::Recovery => "recovery",
        }
    }
}

/// Loop limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixPolicy {
    pub max_iterations: u32,
    pub collaborator_retries: u32,
    pub classifier: Classifier,
}

impl Default for FixPolicy {
    fn default() -> Self {
        Self::from_config(&ForgeConfig::default())
    }
}

impl FixPolicy {
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            max_iterations: config.max_fix_iterations,
            collaborator_retries: config.collaborator_retries,
            classifier: Classifier::from_config(config),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FixOutcome {
    Converged,
    ExhaustedIterations,
    CycleDetected { signature: Signature },
    CompilerUnavailable { reason: String },
    FixerUnavailable { reason: String },
}

impl FixOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixOutcome::Converged => "converged",
            FixOutcome::ExhaustedIterations => "exhausted_iterations",
            FixOutcome::CycleDetected { .. } => "cycle_detected",
            FixOutcome::CompilerUnavailable { .. } => "compiler_unavailable",
            FixOutcome::FixerUnavailable { .. } => "fixer_unavailable",
        }
    }
}

/// One auditable decision of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixDecision {
    pub iteration: u32,
    pub tier: Tier,
    pub strategy: FixStrategy,
    pub units: Vec<String>,
    pub diagnostics: usize,
    pub signature: Signature,
}

/// Full record of one loop run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixLog {
    pub mode: FixMode,
    pub outcome: FixOutcome,
    /// Compiler invocations made.
    pub iterations: u32,
    pub fixes_applied: u32,
    pub decisions: Vec<FixDecision>,
    /// Diagnostics from the last compile (in scope only).
    pub final_diagnostics: Vec<Diagnostic>,
    pub finished_at: DateTime<Utc>,
}

impl FixLog {
    pub fn succeeded(&self) -> bool {
        self.outcome == FixOutcome::Converged
    }

    /// One-line outcome for the user: outcome and iteration count only.
    pub fn summary(&self) -> String {
        let noun = if self.iterations == 1 { "iteration" } else { "iterations" };
        match &self.outcome {
            FixOutcome::Converged => format!("build succeeded after {} {noun}", self.iterations),
            FixOutcome::ExhaustedIterations => format!(
                "build still failing after {} {noun} ({} diagnostics left)",
                self.iterations,
                self.final_diagnostics.len()
            ),
            FixOutcome::CycleDetected { signature } => format!(
                "fixes stopped making progress after {} {noun} (repeating set {})",
                self.iterations,
                signature.short()
            ),
            FixOutcome::CompilerUnavailable { reason } => {
                format!("compiler unavailable after {} {noun}: {reason}", self.iterations)
            }
            FixOutcome::FixerUnavailable { reason } => {
                format!("fix agent unavailable after {} {noun}: {reason}", self.iterations)
            }
        }
    }
}

/// Drives compile/classify/fix iterations against borrowed collaborators.
pub struct BuildFixLoop<'a> {
    compiler: &'a dyn Compiler,
    fixer: &'a dyn Fixer,
    policy: FixPolicy,
}

impl<'a> BuildFixLoop<'a> {
    pub fn new(compiler: &'a dyn Compiler, fixer: &'a dyn Fixer, policy: FixPolicy) -> Self {
        Self {
            compiler,
            fixer,
            policy,
        }
    }

    /// Fix the whole artifact.
    pub async fn run(&self) -> FixLog {
        self.execute(FixMode::Full, BuildScope::Full).await
    }

    /// Fix only `units`. Diagnostics elsewhere are ignored. An empty set is
    /// trivially converged without compiling.
    pub async fn recover(&self, units: BTreeSet<String>) -> FixLog {
        if units.is_empty() {
            return FixLog {
                mode: FixMode::Recovery,
                outcome: FixOutcome::Converged,
                iterations: 0,
                fixes_applied: 0,
                decisions: Vec::new(),
                final_diagnostics: Vec::new(),
                finished_at: Utc::now(),
            };
        }
        self.execute(FixMode::Recovery, BuildScope::Units(units)).await
    }

    async fn execute(&self, mode: FixMode, scope: BuildScope) -> FixLog {
        let max = self.policy.max_iterations;
        let mut iterations = 0u32;
        let mut fixes_applied = 0u32;
        let mut decisions = Vec::new();
        let mut attempted: HashSet<Signature> = HashSet::new();
        let mut current: Vec<Diagnostic> = Vec::new();

        let outcome = loop {
            if iterations >= max {
                break FixOutcome::ExhaustedIterations;
            }

            let raw = match self.compile(&scope).await {
                Ok(raw) => raw,
                Err(reason) => break FixOutcome::CompilerUnavailable { reason },
            };
            iterations += 1;

            current = self
                .policy
                .classifier
                .classify(raw)
                .into_iter()
                .filter(|d| scope.contains(&d.unit))
                .collect();

            let Some(tier) = current.iter().map(|d| d.tier).min() else {
                break FixOutcome::Converged;
            };
            if iterations >= max {
                break FixOutcome::ExhaustedIterations;
            }

            let targeted: Vec<Diagnostic> =
                current.iter().filter(|d| d.tier == tier).cloned().collect();
            let signature = Signature::of(&targeted);
            if !attempted.insert(signature.clone()) {
                warn!(signature = %signature.short(), tier = %tier, "Diagnostic set repeated after a fix");
                break FixOutcome::CycleDetected { signature };
            }

            let action = FixAction::new(iterations, tier, targeted);
            obs::emit_fix_iteration(iterations, tier.as_str(), action.units.len(), action.diagnostic_count());
            decisions.push(FixDecision {
                iteration: iterations,
                tier,
                strategy: action.strategy,
                units: action.unit_names().into_iter().map(str::to_string).collect(),
                diagnostics: action.diagnostic_count(),
                signature,
            });

            match self.apply(&action).await {
                Ok(()) => fixes_applied += 1,
                Err(reason) => break FixOutcome::FixerUnavailable { reason },
            }
        };

        obs::emit_fix_finished(mode.as_str(), outcome.as_str(), iterations);
        FixLog {
            mode,
            outcome,
            iterations,
            fixes_applied,
            decisions,
            final_diagnostics: current,
            finished_at: Utc::now(),
        }
    }

    async fn compile(&self, scope: &BuildScope) -> std::result::Result<Vec<RawDiagnostic>, String> {
        let mut last_error = String::new();
        for attempt in 0..=self.policy.collaborator_retries {
            match self.compiler.compile(scope).await {
                Ok(raw) => {
                    debug!(attempt, diagnostics = raw.len(), "Compile finished");
                    return Ok(raw);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Compiler invocation failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }

    async fn apply(&self, action: &FixAction) -> std::result::Result<(), String> {
        let mut last_error = String::new();
        for attempt in 0..=self.policy.collaborator_retries {
            match self.fixer.apply_fix(action).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, iteration = action.iteration, error = %e, "Fix application failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }
}
