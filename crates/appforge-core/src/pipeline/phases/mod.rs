//! The standard phases, in execution order.

mod analyze;
mod build;
mod fix;
mod plan;
mod recover;
mod route;

pub use analyze::{Analysis, AnalyzePhase, DataModel, DataProperty};
pub use build::{BuildOutput, BuildPhase, ProvisionSummary};
pub use fix::FixPhase;
pub use plan::{Plan, PlanPhase, PlannedUnit};
pub use recover::{RecoverPhase, RecoveryReport};
pub use route::{KeywordRouter, RouteDecision, RoutePhase, RouteSource};

use serde::de::DeserializeOwned;

use super::agent::{parse_reply, AgentRequest, AgentTask};
use super::context::RequestContext;
use super::controller::PipelineDeps;
use super::phase::{Phase, PhaseName};

pub fn standard_phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(RoutePhase::new()),
        Box::new(AnalyzePhase),
        Box::new(PlanPhase),
        Box::new(BuildPhase),
        Box::new(FixPhase),
        Box::new(RecoverPhase),
    ]
}

/// Ask the reasoning agent and parse its JSON answer.
///
/// Both a failed call and an unparseable answer come back as a retry reason.
pub(crate) async fn ask<T: DeserializeOwned + Send>(
    deps: &PipelineDeps,
    ctx: &RequestContext,
    phase: PhaseName,
    task: AgentTask,
    system_prompt: &str,
    user_prompt: String,
) -> Result<T, String> {
    let request = AgentRequest {
        task,
        system_prompt: system_prompt.to_string(),
        user_prompt: format!("{user_prompt}{}", ctx.retry_note(phase)),
        context: ctx.history_lines(),
    };
    let response = deps
        .reasoner
        .complete(&request)
        .await
        .map_err(|e| format!("{} agent call failed: {e}", deps.reasoner.name()))?;
    parse_reply(&response.content).map_err(|e| format!("malformed {phase} answer: {e}"))
}
