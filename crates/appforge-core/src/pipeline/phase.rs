//! Phase contract, pipeline states and the append-only payload ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::RequestContext;
use super::controller::PipelineDeps;
use super::phases::{Analysis, BuildOutput, Plan, RecoveryReport, RouteDecision};
use crate::domain::{ForgeError, Result};
use crate::fixloop::FixLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Route,
    Analyze,
    Plan,
    Build,
    Fix,
    Recover,
}

impl PhaseName {
    /// Standard execution order.
    pub fn all() -> &'static [PhaseName] {
        &[
            PhaseName::Route,
            PhaseName::Analyze,
            PhaseName::Plan,
            PhaseName::Build,
            PhaseName::Fix,
            PhaseName::Recover,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Route => "route",
            PhaseName::Analyze => "analyze",
            PhaseName::Plan => "plan",
            PhaseName::Build => "build",
            PhaseName::Fix => "fix",
            PhaseName::Recover => "recover",
        }
    }

    /// State reached when this phase continues.
    pub fn completed_state(&self) -> PipelineState {
        match self {
            PhaseName::Route => PipelineState::Routed,
            PhaseName::Analyze => PipelineState::Analyzed,
            PhaseName::Plan => PipelineState::Planned,
            PhaseName::Build => PipelineState::Built,
            PhaseName::Fix => PipelineState::Fixed,
            PhaseName::Recover => PipelineState::Recovered,
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PipelineState {
    Pending,
    Routed,
    Analyzed,
    Planned,
    Built,
    Fixed,
    Recovered,
    Done,
    Failed { phase: PhaseName, reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Pending => "pending",
            PipelineState::Routed => "routed",
            PipelineState::Analyzed => "analyzed",
            PipelineState::Planned => "planned",
            PipelineState::Built => "built",
            PipelineState::Fixed => "fixed",
            PipelineState::Recovered => "recovered",
            PipelineState::Done => "done",
            PipelineState::Failed { .. } => "failed",
        }
    }
}

/// What a phase asks the controller to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult<T> {
    Continue(T),
    /// Re-enter the same phase; the reason is added to the request context.
    Retry(String),
    /// Stop the pipeline.
    Fatal(String),
}

impl<T> PhaseResult<T> {
    pub fn label(&self) -> &'static str {
        match self {
            PhaseResult::Continue(_) => "continue",
            PhaseResult::Retry(_) => "retry",
            PhaseResult::Fatal(_) => "fatal",
        }
    }
}

/// Payload a phase hands to later phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "payload")]
pub enum PhasePayload {
    Route(RouteDecision),
    Analysis(Analysis),
    Plan(Plan),
    Build(BuildOutput),
    Fix(FixLog),
    Recover(RecoveryReport),
}

/// Payloads recorded so far, in completion order. Only the controller records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseLedger {
    entries: Vec<(PhaseName, PhasePayload)>,
}

impl PhaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, phase: PhaseName, payload: PhasePayload) -> Result<()> {
        if self.get(phase).is_some() {
            return Err(ForgeError::ContractViolation(format!(
                "payload for phase {phase} already recorded"
            )));
        }
        self.entries.push((phase, payload));
        Ok(())
    }

    pub fn get(&self, phase: PhaseName) -> Option<&PhasePayload> {
        self.entries
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, payload)| payload)
    }

    pub fn phases(&self) -> Vec<PhaseName> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn route(&self) -> Option<&RouteDecision> {
        match self.get(PhaseName::Route)? {
            PhasePayload::Route(v) => Some(v),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        match self.get(PhaseName::Analyze)? {
            PhasePayload::Analysis(v) => Some(v),
            _ => None,
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self.get(PhaseName::Plan)? {
            PhasePayload::Plan(v) => Some(v),
            _ => None,
        }
    }

    pub fn build(&self) -> Option<&BuildOutput> {
        match self.get(PhaseName::Build)? {
            PhasePayload::Build(v) => Some(v),
            _ => None,
        }
    }

    pub fn fix(&self) -> Option<&FixLog> {
        match self.get(PhaseName::Fix)? {
            PhasePayload::Fix(v) => Some(v),
            _ => None,
        }
    }

    pub fn recovery(&self) -> Option<&RecoveryReport> {
        match self.get(PhaseName::Recover)? {
            PhasePayload::Recover(v) => Some(v),
            _ => None,
        }
    }
}

/// Fatal reason for a phase that ran before its prerequisite.
pub(crate) fn missing(prerequisite: PhaseName) -> String {
    format!("no {prerequisite} payload recorded")
}

/// One stage of the pipeline.
#[async_trait]
pub trait Phase: Send + Sync {
    fn name(&self) -> PhaseName;

    async fn run(
        &self,
        ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::phases::RouteSource;
    use crate::domain::{Operation, Platform};

    fn route() -> PhasePayload {
        PhasePayload::Route(RouteDecision {
            platform: Platform::Ios,
            operation: Operation::Create,
            source: RouteSource::Rules,
        })
    }

    #[test]
    fn test_ledger_rejects_second_payload() {
        let mut ledger = PhaseLedger::new();
        ledger.record(PhaseName::Route, route()).unwrap();
        let err = ledger.record(PhaseName::Route, route()).unwrap_err();
        assert!(matches!(err, ForgeError::ContractViolation(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_typed_accessors() {
        let mut ledger = PhaseLedger::new();
        assert!(ledger.route().is_none());
        ledger.record(PhaseName::Route, route()).unwrap();
        assert_eq!(ledger.route().unwrap().platform, Platform::Ios);
        assert!(ledger.analysis().is_none());
        assert_eq!(ledger.phases(), vec![PhaseName::Route]);
    }

    #[test]
    fn test_completed_states_follow_order() {
        let states: Vec<_> = PhaseName::all()
            .iter()
            .map(|p| p.completed_state().label())
            .collect();
        assert_eq!(
            states,
            ["routed", "analyzed", "planned", "built", "fixed", "recovered"]
        );
        assert!(PipelineState::Done.is_terminal());
        assert!(!PipelineState::Built.is_terminal());
    }
}
