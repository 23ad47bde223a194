//! AppForge Core Library
//!
//! Provider capability registry, phase controller and tiered build-fix loop
//! for generating native Apple-platform apps from a natural-language request.

pub mod config;
pub mod domain;
pub mod fixloop;
pub mod obs;
pub mod pipeline;
pub mod providers;
pub mod telemetry;

pub use config::ForgeConfig;

pub use domain::{
    AuthMethod, Confidence, Diagnostic, ForgeError, Hints, ModelRef, Operation, Platform,
    PropertyRef, RawDiagnostic, Result, StorageHint, Tier,
};

pub use fixloop::{
    BuildFixLoop, BuildScope, Classifier, Compiler, FixAction, FixDecision, FixLog, FixMode,
    FixOutcome, FixPolicy, FixStrategy, Fixer, Signature, UnitFix,
};

pub use pipeline::{
    AgentFixer, AgentRequest, AgentResponse, AgentTask, BuildRequest, CodeAgent,
    GenerationReport, GenerationRequest, PipelineController, PipelineDeps, PipelineReport,
    PipelineState, ReasoningAgent,
};

pub use providers::{
    IntegrationInput, IntegrationService, Provider, ProviderDescriptor, ProviderId,
    ProviderRegistry,
};

pub use appforge_state::{
    HistoryEntry, HistoryLog, IntegrationConfig, IntegrationStore, ProjectStore, Role,
};

pub use telemetry::init_tracing;

/// AppForge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
