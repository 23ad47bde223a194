//! Plan: the ordered list of units (source files) to generate.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ask;
use crate::pipeline::agent::AgentTask;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{missing, Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub path: String,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub units: Vec<PlannedUnit>,
}

impl Plan {
    pub fn paths(&self) -> Vec<String> {
        self.units.iter().map(|u| u.path.clone()).collect()
    }

    /// Non-empty, unique, relative paths.
    fn check(&self) -> Result<(), String> {
        if self.units.is_empty() {
            return Err("plan has no units".into());
        }
        let mut seen = HashSet::new();
        for unit in &self.units {
            let path = unit.path.trim();
            if path.is_empty() {
                return Err("plan contains a unit with an empty path".into());
            }
            if path.starts_with('/') || path.split('/').any(|part| part == "..") {
                return Err(format!("unit path must stay inside the project: {path}"));
            }
            if !seen.insert(path) {
                return Err(format!("unit planned twice: {path}"));
            }
        }
        Ok(())
    }
}

const SYSTEM_PROMPT: &str = "You plan the source files of a SwiftUI app. \
Reply with JSON only: {\"units\": [{\"path\": relative file path, \"purpose\": string}]}, \
ordered so that models come before the views that use them.";

pub struct PlanPhase;

#[async_trait]
impl Phase for PlanPhase {
    fn name(&self) -> PhaseName {
        PhaseName::Plan
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        let (Some(route), Some(analysis)) = (ledger.route(), ledger.analysis()) else {
            return PhaseResult::Fatal(missing(PhaseName::Analyze));
        };

        let models: Vec<String> = analysis
            .models
            .iter()
            .map(|m| format!("{} ({:?})", m.name, m.storage))
            .collect();
        let user = format!(
            "App: {} for {}\nSummary: {}\nFeatures: {}\nModels: {}\nIntegrations: {}",
            analysis.app_name,
            route.platform,
            analysis.summary,
            analysis.features.join("; "),
            models.join(", "),
            analysis
                .integrations
                .iter()
                .map(|i| i.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );

        let plan: Plan =
            match ask(deps, ctx, PhaseName::Plan, AgentTask::Plan, SYSTEM_PROMPT, user).await {
                Ok(plan) => plan,
                Err(reason) => return PhaseResult::Retry(reason),
            };
        match plan.check() {
            Ok(()) => PhaseResult::Continue(PhasePayload::Plan(plan)),
            Err(reason) => PhaseResult::Retry(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(paths: &[&str]) -> Plan {
        Plan {
            units: paths
                .iter()
                .map(|p| PlannedUnit {
                    path: p.to_string(),
                    purpose: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_plan_checks() {
        assert!(plan(&["Sources/App.swift", "Sources/Note.swift"]).check().is_ok());
        assert!(plan(&[]).check().unwrap_err().contains("no units"));
        assert!(plan(&["A.swift", "A.swift"]).check().unwrap_err().contains("twice"));
        assert!(plan(&["../etc/passwd"]).check().is_err());
        assert!(plan(&["/abs.swift"]).check().is_err());
    }
}
