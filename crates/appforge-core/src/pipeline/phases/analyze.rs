//! Analyze: app name, features, data model, integrations and auth methods.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ask;
use crate::domain::{AuthMethod, ModelRef, PropertyRef, StorageHint};
use crate::pipeline::agent::AgentTask;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{missing, Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};
use crate::providers::ProviderId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    pub name: String,
    pub storage: StorageHint,
    #[serde(default)]
    pub properties: Vec<DataProperty>,
}

impl From<&DataModel> for ModelRef {
    fn from(model: &DataModel) -> Self {
        model.properties.iter().fold(
            ModelRef::new(model.name.clone(), model.storage),
            |acc, p| {
                let property = PropertyRef::new(p.name.clone(), p.type_name.clone());
                acc.with_property(if p.optional { property.optional() } else { property })
            },
        )
    }
}

/// Validated analysis of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub app_name: String,
    pub summary: String,
    pub features: Vec<String>,
    pub models: Vec<DataModel>,
    pub integrations: Vec<ProviderId>,
    pub auth_methods: Vec<AuthMethod>,
    pub needs_storage: bool,
    pub needs_realtime: bool,
}

impl Analysis {
    pub fn model_refs(&self) -> Vec<ModelRef> {
        self.models.iter().map(ModelRef::from).collect()
    }

    pub fn needs_auth(&self) -> bool {
        !self.auth_methods.is_empty()
    }

    pub fn needs_database(&self) -> bool {
        self.models.iter().any(|m| m.storage == StorageHint::Cloud)
    }
}

/// Wire shape of the agent's answer. Closed enums reject unknown values.
#[derive(Debug, Deserialize)]
struct AnalysisReply {
    app_name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    models: Vec<DataModel>,
    #[serde(default)]
    integrations: Vec<String>,
    #[serde(default)]
    auth_methods: Vec<AuthMethod>,
    #[serde(default)]
    needs_storage: bool,
    #[serde(default)]
    needs_realtime: bool,
}

const SYSTEM_PROMPT: &str = "You analyze app requests. Reply with JSON only: \
{\"app_name\": string, \"summary\": string, \"features\": [string], \
\"models\": [{\"name\": string, \"storage\": \"local\"|\"cloud\", \
\"properties\": [{\"name\": string, \"type\": Swift type, \"optional\": bool}]}], \
\"integrations\": [provider id], \"auth_methods\": [\"email\"|\"apple\"|\"google\"|\"anonymous\"], \
\"needs_storage\": bool, \"needs_realtime\": bool}.";

pub struct AnalyzePhase;

impl AnalyzePhase {
    /// Check the reply against the registry and normalize it.
    fn validate(
        reply: AnalysisReply,
        ctx: &RequestContext,
        deps: &PipelineDeps,
    ) -> Result<Analysis, String> {
        let app_name = ctx
            .app_name
            .clone()
            .unwrap_or(reply.app_name)
            .trim()
            .to_string();
        if app_name.is_empty() {
            return Err("app_name must not be empty".into());
        }

        let mut integrations = Vec::new();
        for id in reply.integrations {
            let id = id.trim().to_lowercase();
            if !deps.registry.contains(&id) {
                let known: Vec<&str> = deps.registry.all().iter().map(|d| d.id.as_str()).collect();
                return Err(format!(
                    "unknown integration '{id}' (known: {})",
                    known.join(", ")
                ));
            }
            let id = ProviderId::new(id);
            if !integrations.contains(&id) {
                integrations.push(id);
            }
        }

        let mut seen = BTreeSet::new();
        for model in &reply.models {
            if model.name.trim().is_empty() {
                return Err("data model with empty name".into());
            }
            if !seen.insert(model.name.as_str()) {
                return Err(format!("duplicate data model '{}'", model.name));
            }
        }

        let mut auth_methods = reply.auth_methods;
        auth_methods.sort();
        auth_methods.dedup();

        Ok(Analysis {
            app_name,
            summary: reply.summary,
            features: reply.features,
            models: reply.models,
            integrations,
            auth_methods,
            needs_storage: reply.needs_storage,
            needs_realtime: reply.needs_realtime,
        })
    }
}

#[async_trait]
impl Phase for AnalyzePhase {
    fn name(&self) -> PhaseName {
        PhaseName::Analyze
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        let Some(route) = ledger.route() else {
            return PhaseResult::Fatal(missing(PhaseName::Route));
        };
        let providers: Vec<String> = deps
            .registry
            .all()
            .iter()
            .map(|d| format!("{} ({})", d.id, d.description))
            .collect();

        let mut user = format!(
            "Platform: {}\nRequest: {}\nAvailable integrations: {}",
            route.platform,
            ctx.prompt,
            providers.join("; ")
        );
        if let Some(name) = &ctx.app_name {
            user.push_str(&format!("\nThe app is named {name}."));
        }

        let reply = match ask::<AnalysisReply>(
            deps,
            ctx,
            PhaseName::Analyze,
            AgentTask::Analyze,
            SYSTEM_PROMPT,
            user,
        )
        .await
        {
            Ok(reply) => reply,
            Err(reason) => return PhaseResult::Retry(reason),
        };

        match Self::validate(reply, ctx, deps) {
            Ok(analysis) => PhaseResult::Continue(PhasePayload::Analysis(analysis)),
            Err(reason) => PhaseResult::Retry(format!("contract violation: {reason}")),
        }
    }
}
