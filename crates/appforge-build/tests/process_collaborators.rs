//! Integration tests for the process-backed compiler and agent.

use std::path::Path;

use appforge_build::{CommandCompiler, CommandSpec, ProcessAgent};
use appforge_core::{
    AgentRequest, AgentTask, BuildFixLoop, BuildScope, CodeAgent, Compiler, FixAction,
    FixOutcome, FixPolicy, Fixer, ForgeConfig, ForgeError, GenerationRequest, Platform,
    ReasoningAgent, Result, Tier,
};
use async_trait::async_trait;

fn sh(name: &str, script: &str) -> CommandSpec {
    CommandSpec::custom(name, vec!["sh".into(), "-c".into(), script.into()], 30)
}

const AGENT_SCRIPT: &str = r#"
input=$(cat)
case "$input" in
  *'"kind":"complete"'*) echo '{"content": "{\"platform\": \"ios\"}"}' ;;
  *'"kind":"generate"'*)
    echo '```json'
    echo '{"generated": ["Sources/A.swift"], "invalid": ["Sources/A.swift"]}'
    echo '```' ;;
  *'"kind":"apply_fix"'*) printf '%s' "$input" > "$(dirname "$0")/last_fix.json" ;;
  *) exit 9 ;;
esac
"#;

fn scripted_agent(dir: &Path) -> ProcessAgent {
    let script = dir.join("agent.sh");
    std::fs::write(&script, AGENT_SCRIPT).unwrap();
    ProcessAgent::new(CommandSpec::custom(
        "scripted-agent",
        vec!["sh".into(), script.to_string_lossy().into_owned()],
        30,
    ))
}

fn generation_request() -> GenerationRequest {
    GenerationRequest {
        app_name: "Notes".into(),
        prompt: "A notes app".into(),
        platform: Platform::Ios,
        units: vec!["Sources/A.swift".into()],
        system_fragments: vec![],
        user_fragments: vec![],
        mcp_servers: vec![],
        allowed_tools: vec![],
    }
}

#[tokio::test]
async fn compiler_reports_located_errors() {
    let compiler = CommandCompiler::new(sh(
        "swift_build",
        "echo 'Sources/A.swift:3:1: error: expected declaration' >&2; exit 1",
    ));

    let diags = compiler.compile(&BuildScope::Full).await.unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].unit, "Sources/A.swift");
    assert_eq!(diags[0].line, Some(3));
}

#[tokio::test]
async fn compiler_clean_build_is_empty() {
    let compiler = CommandCompiler::new(sh("swift_build", "echo 'Build complete!'"));
    assert!(compiler.compile(&BuildScope::Full).await.unwrap().is_empty());
}

#[tokio::test]
async fn compiler_failure_without_errors_is_never_clean() {
    let compiler = CommandCompiler::new(sh("swift_build", "echo 'Killed' >&2; exit 137"));

    let diags = compiler.compile(&BuildScope::Full).await.unwrap();
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("137"));
}

#[tokio::test]
async fn missing_toolchain_is_a_collaborator_error() {
    let compiler = CommandCompiler::new(CommandSpec::custom(
        "swift_build",
        vec!["appforge-missing-toolchain".into()],
        5,
    ));

    let err = compiler.compile(&BuildScope::Full).await.unwrap_err();
    assert!(matches!(err, ForgeError::Collaborator(_)));
}

/// Marks the project fixed by creating a file next to the sources.
struct MarkerFixer<'a> {
    dir: &'a Path,
}

#[async_trait]
impl Fixer for MarkerFixer<'_> {
    async fn apply_fix(&self, action: &FixAction) -> Result<()> {
        assert_eq!(action.tier, Tier::Structural);
        std::fs::write(self.dir.join("fixed"), action.iteration.to_string())?;
        Ok(())
    }
}

#[tokio::test]
async fn fix_loop_converges_against_a_real_process() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = CommandCompiler::new(
        sh(
            "swift_build",
            "test -f fixed || { echo 'App.swift:1:1: error: expected declaration'; exit 1; }",
        )
        .in_dir(dir.path()),
    );
    let fixer = MarkerFixer { dir: dir.path() };

    let log = BuildFixLoop::new(&compiler, &fixer, FixPolicy::from_config(&ForgeConfig::default()))
        .run()
        .await;

    assert_eq!(log.outcome, FixOutcome::Converged);
    assert_eq!(log.iterations, 2);
    assert_eq!(log.decisions[0].units, ["App.swift"]);
}

#[tokio::test]
async fn agent_answers_reasoning_requests() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(dir.path());

    let response = agent
        .complete(&AgentRequest {
            task: AgentTask::Route,
            system_prompt: "route".into(),
            user_prompt: "A notes app".into(),
            context: vec![],
        })
        .await
        .unwrap();
    assert_eq!(response.content, r#"{"platform": "ios"}"#);
}

#[tokio::test]
async fn agent_generation_report_tolerates_fences() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(dir.path());

    let report = agent.generate(&generation_request()).await.unwrap();
    assert_eq!(report.generated, ["Sources/A.swift"]);
    assert_eq!(report.invalid, ["Sources/A.swift"]);
}

#[tokio::test]
async fn agent_receives_fix_actions_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(dir.path());
    let action = FixAction::new(3, Tier::Scope, vec![]);

    CodeAgent::apply_fix(&agent, &action).await.unwrap();

    let written = std::fs::read_to_string(dir.path().join("last_fix.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["kind"], "apply_fix");
    assert_eq!(json["action"]["iteration"], 3);
}

#[tokio::test]
async fn failing_agent_is_a_collaborator_error() {
    let agent = ProcessAgent::new(sh("broken-agent", "cat >/dev/null; echo 'quota exceeded' >&2; exit 3"));

    let err = agent.generate(&generation_request()).await.unwrap_err();
    match err {
        ForgeError::Collaborator(msg) => {
            assert!(msg.contains("exited with code 3"));
            assert!(msg.contains("quota exceeded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn plain_text_answers_pass_through() {
    let agent = ProcessAgent::new(sh("plain-agent", "cat >/dev/null; echo '  hello  '"));

    let response = agent
        .complete(&AgentRequest {
            task: AgentTask::Plan,
            system_prompt: String::new(),
            user_prompt: String::new(),
            context: vec![],
        })
        .await
        .unwrap();
    assert_eq!(response.content, "hello");
}
