//! Recover: regenerate planned units that are missing or that the code agent
//! flagged as invalid, then run the build-fix loop scoped to just those units.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::Tier;
use crate::fixloop::{BuildFixLoop, FixAction, FixLog, FixPolicy, FixStrategy, UnitFix};
use crate::pipeline::agent::AgentFixer;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{missing, Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Units recovery was scoped to.
    pub targets: Vec<String>,
    /// Planned units that were never generated.
    pub missing: Vec<String>,
    /// Units the code agent flagged as invalid.
    pub invalid: Vec<String>,
    /// `None` when there was nothing to recover.
    pub log: Option<FixLog>,
}

/// `(planned - generated) ∪ (invalid ∩ planned)`, plus the missing part alone.
pub(crate) fn recovery_targets(
    planned: &[String],
    generated: &[String],
    invalid: &[String],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let planned: BTreeSet<&String> = planned.iter().collect();
    let generated: BTreeSet<&String> = generated.iter().collect();
    let invalid: BTreeSet<&String> = invalid.iter().collect();

    let missing: BTreeSet<String> = planned
        .difference(&generated)
        .map(|u| u.to_string())
        .collect();
    let mut targets = missing.clone();
    targets.extend(planned.intersection(&invalid).map(|u| u.to_string()));
    (targets, missing)
}

pub struct RecoverPhase;

#[async_trait]
impl Phase for RecoverPhase {
    fn name(&self) -> PhaseName {
        PhaseName::Recover
    }

    async fn run(
        &self,
        _ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        let (Some(plan), Some(build)) = (ledger.plan(), ledger.build()) else {
            return PhaseResult::Fatal(missing(PhaseName::Build));
        };
        let (targets, missing_units) =
            recovery_targets(&plan.paths(), &build.generated, &build.invalid);
        if targets.is_empty() {
            return PhaseResult::Continue(PhasePayload::Recover(RecoveryReport::default()));
        }
        info!(targets = targets.len(), missing = missing_units.len(), "Recovering units");

        // Every target is rewritten before the scoped compile.
        let action = FixAction {
            iteration: 0,
            tier: Tier::Structural,
            strategy: FixStrategy::Regenerate,
            units: targets
                .iter()
                .map(|unit| UnitFix {
                    unit: unit.clone(),
                    diagnostics: Vec::new(),
                })
                .collect(),
        };
        if let Err(e) = deps.coder.apply_fix(&action).await {
            return PhaseResult::Retry(format!("regenerating units failed: {e}"));
        }

        let fixer = AgentFixer(deps.coder.as_ref());
        let log = BuildFixLoop::new(
            deps.compiler.as_ref(),
            &fixer,
            FixPolicy::from_config(&deps.config),
        )
        .recover(targets.clone())
        .await;

        if !log.succeeded() {
            return PhaseResult::Fatal(format!("recovery {}", log.summary()));
        }
        PhaseResult::Continue(PhasePayload::Recover(RecoveryReport {
            invalid: targets.difference(&missing_units).cloned().collect(),
            targets: targets.into_iter().collect(),
            missing: missing_units.into_iter().collect(),
            log: Some(log),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_targets_cover_missing_and_invalid() {
        let (targets, missing) = recovery_targets(
            &units(&["X", "Y", "Z"]),
            &units(&["X", "Y"]),
            &units(&["Y", "Stray"]),
        );
        assert_eq!(targets, BTreeSet::from(["Y".to_string(), "Z".to_string()]));
        assert_eq!(missing, BTreeSet::from(["Z".to_string()]));
    }

    #[test]
    fn test_nothing_to_recover() {
        let (targets, missing) =
            recovery_targets(&units(&["X"]), &units(&["X"]), &units(&[]));
        assert!(targets.is_empty());
        assert!(missing.is_empty());
    }
}
