use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;

use appforge_core::{
    BuildFixLoop, BuildScope, Compiler, FixAction, FixOutcome, FixPolicy, FixStrategy, Fixer,
    ForgeConfig, RawDiagnostic, Result, Tier,
};
use async_trait::async_trait;

/// Replays canned compiler outputs; the last one repeats forever.
struct ScriptedCompiler {
    outputs: Mutex<VecDeque<Vec<RawDiagnostic>>>,
    scopes: Mutex<Vec<BuildScope>>,
}

impl ScriptedCompiler {
    fn new(outputs: Vec<Vec<RawDiagnostic>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            scopes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn compile(&self, scope: &BuildScope) -> Result<Vec<RawDiagnostic>> {
        self.scopes.lock().unwrap().push(scope.clone());
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.len() > 1 {
            Ok(outputs.pop_front().unwrap())
        } else {
            Ok(outputs.front().cloned().unwrap_or_default())
        }
    }
}

#[derive(Default)]
struct RecordingFixer {
    actions: Mutex<Vec<FixAction>>,
}

#[async_trait]
impl Fixer for RecordingFixer {
    async fn apply_fix(&self, action: &FixAction) -> Result<()> {
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }
}

fn policy() -> FixPolicy {
    FixPolicy::from_config(&ForgeConfig::default())
}

fn structural(unit: &str) -> RawDiagnostic {
    RawDiagnostic::new(unit, "expected declaration").at(1, 1)
}

fn scope_error(unit: &str, name: &str, line: u32) -> RawDiagnostic {
    RawDiagnostic::new(unit, format!("cannot find '{name}' in scope")).at(line, 5)
}

#[tokio::test]
async fn structural_diagnostic_fixed_once_converges_in_two_iterations() {
    let compiler = ScriptedCompiler::new(vec![vec![structural("App.swift")], vec![]]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy()).run().await;

    assert_eq!(log.outcome, FixOutcome::Converged);
    assert_eq!(log.iterations, 2);
    assert_eq!(log.fixes_applied, 1);
    assert!(log.final_diagnostics.is_empty());

    let actions = fixer.actions.lock().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].tier, Tier::Structural);
    assert_eq!(actions[0].strategy, FixStrategy::Regenerate);
}

#[tokio::test]
async fn identical_reproduction_after_fix_is_a_cycle() {
    let same = vec![RawDiagnostic::new("Store.swift", "type 'Store' does not conform to protocol 'Sendable'").at(4, 1)];
    let compiler = ScriptedCompiler::new(vec![same]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy()).run().await;

    assert!(matches!(log.outcome, FixOutcome::CycleDetected { .. }));
    assert_eq!(log.iterations, 2);
    assert_eq!(fixer.actions.lock().unwrap().len(), 1);
    assert!(log.iterations <= policy().max_iterations);
    assert!(log.summary().contains("2 iterations"));
}

#[tokio::test]
async fn moved_line_numbers_still_count_as_a_cycle() {
    let compiler = ScriptedCompiler::new(vec![
        vec![RawDiagnostic::new("A.swift", "missing argument for parameter 'id' in call").at(10, 3)],
        vec![RawDiagnostic::new("A.swift", "Missing argument for parameter 'id' in call").at(12, 7)],
    ]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy()).run().await;
    assert!(matches!(log.outcome, FixOutcome::CycleDetected { .. }));
}

#[tokio::test]
async fn mixed_tiers_target_structural_first() {
    let compiler = ScriptedCompiler::new(vec![
        vec![
            scope_error("List.swift", "Row", 40),
            structural("App.swift"),
            scope_error("List.swift", "Cell", 41),
        ],
        vec![scope_error("List.swift", "Row", 40)],
        vec![],
    ]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy()).run().await;
    assert!(log.succeeded());
    assert_eq!(log.iterations, 3);

    let actions = fixer.actions.lock().unwrap();
    assert_eq!(actions[0].tier, Tier::Structural);
    assert_eq!(actions[0].unit_names(), ["App.swift"]);
    assert_eq!(actions[0].diagnostic_count(), 1);
    assert_eq!(actions[1].tier, Tier::Scope);
    assert_eq!(actions[1].strategy, FixStrategy::Patch);
}

#[tokio::test]
async fn recovery_touches_only_the_scoped_unit() {
    let compiler = ScriptedCompiler::new(vec![
        vec![
            scope_error("X.swift", "A", 30),
            scope_error("Y.swift", "B", 30),
            scope_error("Z.swift", "C", 30),
        ],
        vec![scope_error("X.swift", "A", 30), scope_error("Z.swift", "C", 30)],
    ]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy())
        .recover(BTreeSet::from(["Y.swift".to_string()]))
        .await;

    assert!(log.succeeded());
    assert_eq!(log.iterations, 2);
    for action in fixer.actions.lock().unwrap().iter() {
        assert_eq!(action.unit_names(), ["Y.swift"]);
    }
    for scope in compiler.scopes.lock().unwrap().iter() {
        assert!(scope.contains("Y.swift"));
        assert!(!scope.contains("X.swift"));
    }
}

#[tokio::test]
async fn exhausts_iterations_when_every_fix_uncovers_something_new() {
    let outputs = (0..10)
        .map(|i| vec![scope_error("A.swift", &format!("Symbol{i}"), 50)])
        .collect();
    let compiler = ScriptedCompiler::new(outputs);
    let fixer = RecordingFixer::default();
    let policy = FixPolicy::from_config(&ForgeConfig::default().with_max_fix_iterations(3));

    let log = BuildFixLoop::new(&compiler, &fixer, policy).run().await;

    assert_eq!(log.outcome, FixOutcome::ExhaustedIterations);
    assert_eq!(log.iterations, 3);
    assert_eq!(fixer.actions.lock().unwrap().len(), 2);
    assert_eq!(log.final_diagnostics.len(), 1);
}

#[tokio::test]
async fn scope_cluster_is_regenerated_not_patched() {
    let compiler = ScriptedCompiler::new(vec![
        vec![
            scope_error("Broken.swift", "Foundation", 1),
            scope_error("Broken.swift", "View", 3),
            scope_error("Broken.swift", "State", 4),
        ],
        vec![],
    ]);
    let fixer = RecordingFixer::default();

    let log = BuildFixLoop::new(&compiler, &fixer, policy()).run().await;
    assert!(log.succeeded());

    let actions = fixer.actions.lock().unwrap();
    assert_eq!(actions[0].tier, Tier::Structural);
    assert_eq!(actions[0].strategy, FixStrategy::Regenerate);
}
