//! Phase controller: runs phases in order, applying retry and failure policy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use appforge_state::ProjectStore;
use serde::{Deserialize, Serialize};
use tracing::{warn, Instrument};
use uuid::Uuid;

use super::agent::{CodeAgent, ReasoningAgent};
use super::context::{BuildRequest, RequestContext};
use super::phase::{Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult, PipelineState};
use super::phases::standard_phases;
use crate::config::ForgeConfig;
use crate::fixloop::Compiler;
use crate::obs;
use crate::providers::ProviderRegistry;

/// Collaborators and configuration shared by every phase.
#[derive(Clone)]
pub struct PipelineDeps {
    pub registry: Arc<ProviderRegistry>,
    pub store: ProjectStore,
    pub reasoner: Arc<dyn ReasoningAgent>,
    pub coder: Arc<dyn CodeAgent>,
    pub compiler: Arc<dyn Compiler>,
    pub config: ForgeConfig,
}

impl std::fmt::Debug for PipelineDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDeps")
            .field("registry", &self.registry)
            .field("store", &self.store)
            .field("reasoner", &self.reasoner.name())
            .field("coder", &self.coder.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub request_id: Uuid,
    pub state: PipelineState,
    /// Attempts per phase that ran.
    pub attempts: BTreeMap<PhaseName, u32>,
    /// Compiler invocations across the fix and recover phases.
    pub fix_iterations: u32,
    pub warnings: Vec<String>,
    pub ledger: PhaseLedger,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn failure(&self) -> Option<(PhaseName, &str)> {
        match &self.state {
            PipelineState::Failed { phase, reason } => Some((*phase, reason.as_str())),
            _ => None,
        }
    }

    /// Short user-facing outcome.
    pub fn summary(&self) -> String {
        match self.failure() {
            Some((phase, reason)) => format!("failed during {phase}: {reason}"),
            None => {
                let app = self
                    .ledger
                    .analysis()
                    .map(|a| a.app_name.as_str())
                    .unwrap_or("app");
                let units = self.ledger.build().map_or(0, |b| b.generated.len());
                format!(
                    "{app}: {units} units generated, build fixed in {} iterations",
                    self.fix_iterations
                )
            }
        }
    }
}

pub struct PipelineController {
    deps: PipelineDeps,
    phases: Vec<Box<dyn Phase>>,
}

impl PipelineController {
    /// Controller running route, analyze, plan, build, fix and recover.
    pub fn new(deps: PipelineDeps) -> Self {
        Self::with_phases(deps, standard_phases())
    }

    pub fn with_phases(deps: PipelineDeps, phases: Vec<Box<dyn Phase>>) -> Self {
        Self { deps, phases }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    pub async fn run(&self, request: BuildRequest) -> PipelineReport {
        let history = match self
            .deps
            .store
            .history()
            .recent(self.deps.config.history_context)
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "History unavailable; continuing without context");
                Vec::new()
            }
        };
        let ctx = RequestContext::new(request, history);
        let span = obs::request_span(&ctx.request_id.to_string());
        self.drive(ctx).instrument(span).await
    }

    async fn drive(&self, mut ctx: RequestContext) -> PipelineReport {
        let started = Instant::now();
        let request_id = ctx.request_id.to_string();
        obs::emit_pipeline_started(&request_id, ctx.app_name.as_deref());

        let ceiling = self.deps.config.phase_retry_ceiling;
        let mut state = PipelineState::Pending;
        let mut ledger = PhaseLedger::new();
        let mut attempts = BTreeMap::new();
        let mut warnings = Vec::new();

        'phases: for phase in &self.phases {
            let name = phase.name();
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                attempts.insert(name, attempt);
                obs::emit_phase_started(name.as_str(), attempt);

                let phase_started = Instant::now();
                let result = phase.run(&ctx, &ledger, &self.deps).await;
                obs::emit_phase_finished(
                    name.as_str(),
                    attempt,
                    result.label(),
                    phase_started.elapsed().as_millis() as u64,
                );

                match result {
                    PhaseResult::Continue(payload) => {
                        if let PhasePayload::Build(output) = &payload {
                            warnings.extend(output.warnings.iter().cloned());
                        }
                        if let Err(e) = ledger.record(name, payload) {
                            state = PipelineState::Failed {
                                phase: name,
                                reason: e.to_string(),
                            };
                            break 'phases;
                        }
                        state = name.completed_state();
                        break;
                    }
                    PhaseResult::Retry(reason) => {
                        if attempt > ceiling {
                            state = PipelineState::Failed {
                                phase: name,
                                reason: format!(
                                    "gave up after {attempt} attempts (retry ceiling {ceiling}): {reason}"
                                ),
                            };
                            break 'phases;
                        }
                        obs::emit_phase_retry(name.as_str(), attempt, &reason);
                        ctx.push_retry(name, reason);
                    }
                    PhaseResult::Fatal(reason) => {
                        state = PipelineState::Failed { phase: name, reason };
                        break 'phases;
                    }
                }
            }
        }

        if !state.is_terminal() {
            state = PipelineState::Done;
        }

        let fix_iterations = ledger.fix().map_or(0, |log| log.iterations)
            + ledger
                .recovery()
                .and_then(|r| r.log.as_ref())
                .map_or(0, |log| log.iterations);
        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(
            &request_id,
            state.label(),
            duration_ms,
            state == PipelineState::Done,
        );

        PipelineReport {
            request_id: ctx.request_id,
            state,
            attempts,
            fix_iterations,
            warnings,
            ledger,
            duration_ms,
        }
    }
}
