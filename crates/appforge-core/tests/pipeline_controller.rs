use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use appforge_core::pipeline::phases::RouteSource;
use appforge_core::pipeline::PhaseName;
use appforge_core::{
    AgentRequest, AgentResponse, AgentTask, BuildRequest, BuildScope, CodeAgent, Compiler,
    FixAction, FixStrategy, ForgeConfig, ForgeError, GenerationReport, GenerationRequest,
    PipelineController, PipelineDeps, PipelineState, Platform, ProjectStore, ProviderRegistry,
    RawDiagnostic, ReasoningAgent, Result, Role,
};
use async_trait::async_trait;

const ANALYSIS: &str = r#"{
    "app_name": "Notes",
    "summary": "Take and pin notes",
    "features": ["create notes", "pin notes"],
    "models": [{"name": "Note", "storage": "local",
                "properties": [{"name": "title", "type": "String"}]}],
    "auth_methods": []
}"#;

const PLAN: &str = r#"{"units": [
    {"path": "Sources/Note.swift", "purpose": "model"},
    {"path": "Sources/NotesApp.swift", "purpose": "entry point"}
]}"#;

/// Canned replies per task; the last reply for a task repeats.
#[derive(Default)]
struct ScriptedReasoner {
    replies: Mutex<HashMap<AgentTask, VecDeque<String>>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedReasoner {
    fn standard() -> Self {
        Self::default().reply(AgentTask::Analyze, ANALYSIS).reply(AgentTask::Plan, PLAN)
    }

    fn reply(self, task: AgentTask, content: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(content.to_string());
        self
    }

    fn calls(&self, task: AgentTask) -> Vec<AgentRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReasoningAgent for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &AgentRequest) -> Result<AgentResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&request.task)
            .ok_or_else(|| ForgeError::Collaborator(format!("no reply for {:?}", request.task)))?;
        let content = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(AgentResponse { content })
    }
}

/// Writes a fixed subset of the planned units and records fixes.
#[derive(Default)]
struct FakeCoder {
    skip: Vec<String>,
    invalid: Vec<String>,
    requests: Mutex<Vec<GenerationRequest>>,
    fixes: Mutex<Vec<FixAction>>,
}

#[async_trait]
impl CodeAgent for FakeCoder {
    fn name(&self) -> &str {
        "fake-coder"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReport> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(GenerationReport {
            generated: request
                .units
                .iter()
                .filter(|u| !self.skip.contains(u))
                .cloned()
                .collect(),
            invalid: self.invalid.clone(),
        })
    }

    async fn apply_fix(&self, action: &FixAction) -> Result<()> {
        self.fixes.lock().unwrap().push(action.clone());
        Ok(())
    }
}

/// Replays canned outputs; the last one repeats. `None` means the compiler is down.
struct ScriptedCompiler {
    outputs: Mutex<VecDeque<Option<Vec<RawDiagnostic>>>>,
    scopes: Mutex<Vec<BuildScope>>,
}

impl ScriptedCompiler {
    fn new(outputs: Vec<Option<Vec<RawDiagnostic>>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            scopes: Mutex::new(Vec::new()),
        }
    }

    fn clean() -> Self {
        Self::new(vec![Some(vec![])])
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn compile(&self, scope: &BuildScope) -> Result<Vec<RawDiagnostic>> {
        self.scopes.lock().unwrap().push(scope.clone());
        let mut outputs = self.outputs.lock().unwrap();
        let next = if outputs.len() > 1 {
            outputs.pop_front().flatten()
        } else {
            outputs.front().cloned().flatten()
        };
        next.ok_or_else(|| ForgeError::Collaborator("toolchain not found".into()))
    }
}

struct Harness {
    reasoner: Arc<ScriptedReasoner>,
    coder: Arc<FakeCoder>,
    compiler: Arc<ScriptedCompiler>,
    controller: PipelineController,
}

fn harness(
    reasoner: ScriptedReasoner,
    coder: FakeCoder,
    compiler: ScriptedCompiler,
    config: ForgeConfig,
    store: ProjectStore,
) -> Harness {
    let reasoner = Arc::new(reasoner);
    let coder = Arc::new(coder);
    let compiler = Arc::new(compiler);
    let deps = PipelineDeps {
        registry: Arc::new(ProviderRegistry::with_defaults(&config).unwrap()),
        store,
        reasoner: reasoner.clone(),
        coder: coder.clone(),
        compiler: compiler.clone(),
        config,
    };
    Harness {
        reasoner,
        coder,
        compiler,
        controller: PipelineController::new(deps),
    }
}

#[tokio::test]
async fn happy_path_reaches_done() {
    let h = harness(
        ScriptedReasoner::standard(),
        FakeCoder::default(),
        ScriptedCompiler::new(vec![
            Some(vec![RawDiagnostic::new("Sources/Note.swift", "expected declaration").at(1, 1)]),
            Some(vec![]),
        ]),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h
        .controller
        .run(BuildRequest::new("A notes app for my iPhone"))
        .await;

    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.fix_iterations, 2);
    assert!(report.attempts.values().all(|&n| n == 1));
    assert_eq!(report.ledger.len(), PhaseName::all().len());

    let route = report.ledger.route().unwrap();
    assert_eq!(route.platform, Platform::Ios);
    assert_eq!(route.source, RouteSource::Rules);
    assert!(h.reasoner.calls(AgentTask::Route).is_empty());

    let generation = &h.coder.requests.lock().unwrap()[0];
    assert_eq!(generation.app_name, "Notes");
    assert_eq!(generation.units, ["Sources/Note.swift", "Sources/NotesApp.swift"]);

    let fixes = h.coder.fixes.lock().unwrap();
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].strategy, FixStrategy::Regenerate);
    assert!(report.ledger.recovery().unwrap().log.is_none());
    assert!(report.summary().contains("2 units generated"));
}

#[tokio::test]
async fn ambiguous_platform_falls_back_to_the_agent() {
    let reasoner =
        ScriptedReasoner::standard().reply(AgentTask::Route, r#"{"platform": "ipados"}"#);
    let h = harness(
        reasoner,
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h
        .controller
        .run(BuildRequest::new("A notes app for iPhone and iPad"))
        .await;

    assert!(report.succeeded(), "{}", report.summary());
    let route = report.ledger.route().unwrap();
    assert_eq!(route.platform, Platform::Ipados);
    assert_eq!(route.source, RouteSource::Agent);

    let calls = h.reasoner.calls(AgentTask::Route);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].user_prompt.contains("several platforms"));
}

#[tokio::test]
async fn rejected_answer_is_retried_with_the_reason() {
    let reasoner = ScriptedReasoner::default()
        .reply(
            AgentTask::Analyze,
            r#"{"app_name": "Notes", "integrations": ["firebase"]}"#,
        )
        .reply(AgentTask::Analyze, ANALYSIS)
        .reply(AgentTask::Plan, PLAN);
    let h = harness(
        reasoner,
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for macOS")).await;

    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(report.attempts[&PhaseName::Analyze], 2);

    let calls = h.reasoner.calls(AgentTask::Analyze);
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].user_prompt.contains("rejected"));
    assert!(calls[1].user_prompt.contains("unknown integration 'firebase'"));
}

#[tokio::test]
async fn retry_ceiling_turns_repeated_retries_into_failure() {
    let reasoner = ScriptedReasoner::default()
        .reply(AgentTask::Analyze, ANALYSIS)
        .reply(AgentTask::Plan, "I would start with a model file.");
    let h = harness(
        reasoner,
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default().with_phase_retry_ceiling(2),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for macOS")).await;

    let (phase, reason) = report.failure().unwrap();
    assert_eq!(phase, PhaseName::Plan);
    assert!(reason.contains("gave up after 3 attempts"));
    assert!(reason.contains("malformed"));
    assert_eq!(report.attempts[&PhaseName::Plan], 3);
    assert_eq!(h.reasoner.calls(AgentTask::Plan).len(), 3);
    assert!(report.ledger.plan().is_none());
    assert!(!report.attempts.contains_key(&PhaseName::Build));
    assert!(h.coder.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn zero_ceiling_fails_on_first_retry() {
    let reasoner = ScriptedReasoner::default().reply(AgentTask::Analyze, "{}");
    let h = harness(
        reasoner,
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default().with_phase_retry_ceiling(0),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for macOS")).await;

    assert_eq!(report.failure().map(|(p, _)| p), Some(PhaseName::Analyze));
    assert_eq!(report.attempts[&PhaseName::Analyze], 1);
}

#[tokio::test]
async fn unavailable_compiler_fails_the_fix_phase() {
    let h = harness(
        ScriptedReasoner::standard(),
        FakeCoder::default(),
        ScriptedCompiler::new(vec![None]),
        ForgeConfig::default().with_collaborator_retries(1),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for my iPhone")).await;

    let (phase, reason) = report.failure().unwrap();
    assert_eq!(phase, PhaseName::Fix);
    assert!(reason.contains("compiler unavailable"));
    assert_eq!(report.attempts[&PhaseName::Fix], 1);
    assert_eq!(h.compiler.scopes.lock().unwrap().len(), 2);
    assert!(report.ledger.build().is_some());
    assert!(report.ledger.fix().is_none());
}

#[tokio::test]
async fn missing_units_are_regenerated_and_recovered() {
    let coder = FakeCoder {
        skip: vec!["Sources/NotesApp.swift".to_string()],
        ..FakeCoder::default()
    };
    let h = harness(
        ScriptedReasoner::standard(),
        coder,
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for my iPhone")).await;

    assert!(report.succeeded(), "{}", report.summary());
    let recovery = report.ledger.recovery().unwrap();
    assert_eq!(recovery.targets, ["Sources/NotesApp.swift"]);
    assert_eq!(recovery.missing, ["Sources/NotesApp.swift"]);
    assert!(recovery.invalid.is_empty());
    assert_eq!(report.fix_iterations, 2);

    let fixes = h.coder.fixes.lock().unwrap();
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].iteration, 0);
    assert_eq!(fixes[0].unit_names(), ["Sources/NotesApp.swift"]);

    let scopes = h.compiler.scopes.lock().unwrap();
    assert_eq!(scopes[0], BuildScope::Full);
    assert!(scopes[1].contains("Sources/NotesApp.swift"));
    assert!(!scopes[1].contains("Sources/Note.swift"));
}

#[tokio::test]
async fn invalid_units_are_regenerated_even_when_the_build_is_clean() {
    let coder = FakeCoder {
        invalid: vec!["Sources/Note.swift".to_string(), "Sources/Stray.swift".to_string()],
        ..FakeCoder::default()
    };
    let h = harness(
        ScriptedReasoner::standard(),
        coder,
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h.controller.run(BuildRequest::new("Notes for my iPhone")).await;

    assert!(report.succeeded(), "{}", report.summary());
    let recovery = report.ledger.recovery().unwrap();
    assert_eq!(recovery.targets, ["Sources/Note.swift"]);
    assert_eq!(recovery.invalid, ["Sources/Note.swift"]);
    assert!(recovery.missing.is_empty());

    let fixes = h.coder.fixes.lock().unwrap();
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].iteration, 0);
    assert_eq!(fixes[0].strategy, FixStrategy::Regenerate);
    assert_eq!(fixes[0].unit_names(), ["Sources/Note.swift"]);

    let scopes = h.compiler.scopes.lock().unwrap();
    assert!(scopes[1].contains("Sources/Note.swift"));
    assert!(!scopes[1].contains("Sources/NotesApp.swift"));
}

#[tokio::test]
async fn history_is_passed_to_the_reasoning_agent() {
    let store = ProjectStore::in_memory();
    store.history().append(Role::User, "make me a notes app").unwrap();
    store.history().append(Role::Assistant, "Notes: 2 units generated").unwrap();

    let h = harness(
        ScriptedReasoner::standard(),
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        store,
    );

    let report = h
        .controller
        .run(BuildRequest::new("Add pinning to the iPhone notes app"))
        .await;
    assert!(report.succeeded(), "{}", report.summary());

    let analyze = &h.reasoner.calls(AgentTask::Analyze)[0];
    assert_eq!(
        analyze.context,
        ["user: make me a notes app", "assistant: Notes: 2 units generated"]
    );
}

#[tokio::test]
async fn explicit_app_name_overrides_the_analysis() {
    let h = harness(
        ScriptedReasoner::standard(),
        FakeCoder::default(),
        ScriptedCompiler::clean(),
        ForgeConfig::default(),
        ProjectStore::in_memory(),
    );

    let report = h
        .controller
        .run(BuildRequest::new("Notes for my iPhone").with_app_name("Jotter"))
        .await;

    assert_eq!(report.ledger.analysis().unwrap().app_name, "Jotter");
    assert_eq!(h.coder.requests.lock().unwrap()[0].app_name, "Jotter");
}
