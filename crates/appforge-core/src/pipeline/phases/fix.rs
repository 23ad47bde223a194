//! Fix: run the build-fix loop over the whole artifact.

use async_trait::async_trait;
use tracing::info;

use crate::fixloop::{BuildFixLoop, FixPolicy};
use crate::pipeline::agent::AgentFixer;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{missing, Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};

pub struct FixPhase;

#[async_trait]
impl Phase for FixPhase {
    fn name(&self) -> PhaseName {
        PhaseName::Fix
    }

    async fn run(
        &self,
        _ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        if ledger.build().is_none() {
            return PhaseResult::Fatal(missing(PhaseName::Build));
        }

        let fixer = AgentFixer(deps.coder.as_ref());
        let log = BuildFixLoop::new(
            deps.compiler.as_ref(),
            &fixer,
            FixPolicy::from_config(&deps.config),
        )
        .run()
        .await;

        info!(outcome = log.outcome.as_str(), iterations = log.iterations, "Build-fix loop finished");
        if log.succeeded() {
            PhaseResult::Continue(PhasePayload::Fix(log))
        } else {
            PhaseResult::Fatal(log.summary())
        }
    }
}
