//! Request pipeline: route, analyze, plan, build, fix, recover.
//!
//! Each phase reads the request context and the payloads of earlier phases
//! and returns `Continue`, `Retry` or `Fatal`. The controller owns the
//! ledger and the retry policy.

pub mod agent;
pub mod context;
pub mod controller;
pub mod phase;
pub mod phases;

pub use agent::{
    AgentFixer, AgentRequest, AgentResponse, AgentTask, CodeAgent, GenerationReport,
    GenerationRequest, ReasoningAgent,
};
pub use context::{BuildRequest, RequestContext};
pub use controller::{PipelineController, PipelineDeps, PipelineReport};
pub use phase::{Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult, PipelineState};
