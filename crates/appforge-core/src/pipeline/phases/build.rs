//! Build: fold provider contributions into a generation request, optionally
//! provision backend resources, and have the code agent write the units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::analyze::Analysis;
use crate::domain::ForgeError;
use crate::obs;
use crate::pipeline::agent::GenerationRequest;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{missing, Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};
use crate::providers::registry::stored_config;
use crate::providers::{PromptContribution, ProviderId, ProvisionRequest, ProvisionResult};

/// Provisioning outcome for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSummary {
    pub provider_id: ProviderId,
    pub result: ProvisionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub generated: Vec<String>,
    pub invalid: Vec<String>,
    pub contributions: Vec<PromptContribution>,
    pub provisioning: Vec<ProvisionSummary>,
    /// Tool server names only; launch environments are not kept.
    pub mcp_servers: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct BuildPhase;

impl BuildPhase {
    /// Provision every selected provider whose backend is configured.
    /// Failures become warnings.
    async fn provision(
        analysis: &Analysis,
        contributions: &[PromptContribution],
        deps: &PipelineDeps,
        warnings: &mut Vec<String>,
    ) -> Vec<ProvisionSummary> {
        let mut summaries = Vec::new();
        let models = analysis.model_refs();

        for id in &analysis.integrations {
            let Some(provider) = deps.registry.get(id.as_str()) else {
                continue;
            };
            let Some(provisioner) = provider.as_provisioner() else {
                continue;
            };
            let ready = contributions
                .iter()
                .any(|c| &c.provider_id == id && c.backend_ready);
            let config = stored_config(&deps.store, id, &analysis.app_name, warnings);
            let Some(config) = config.filter(|_| ready) else {
                let warning = format!(
                    "{id}: no validated integration for {}; backend resources not provisioned",
                    analysis.app_name
                );
                obs::emit_provision_warning(id.as_str(), &warning);
                warnings.push(warning);
                continue;
            };

            let request = ProvisionRequest {
                app_name: analysis.app_name.clone(),
                config,
                needs_auth: analysis.needs_auth(),
                needs_database: analysis.needs_database(),
                needs_storage: analysis.needs_storage,
                needs_realtime: analysis.needs_realtime,
                auth_methods: analysis.auth_methods.clone(),
                models: models.clone(),
            };
            let deadline = tokio::time::Instant::now() + deps.config.provision_timeout;
            match provisioner.provision(&request, deadline).await {
                Ok(result) => {
                    warnings.extend(result.warnings.iter().map(|w| format!("{id}: {w}")));
                    if result.needs_platform_setup {
                        warnings.push(format!(
                            "{id}: enable the requested sign-in providers in the provider dashboard"
                        ));
                    }
                    summaries.push(ProvisionSummary {
                        provider_id: id.clone(),
                        result,
                    });
                }
                Err(e) => {
                    let warning = format!("{id}: provisioning skipped: {e}");
                    obs::emit_provision_warning(id.as_str(), &warning);
                    warnings.push(warning);
                }
            }
        }
        summaries
    }
}

#[async_trait]
impl Phase for BuildPhase {
    fn name(&self) -> PhaseName {
        PhaseName::Build
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        let (Some(route), Some(analysis), Some(plan)) =
            (ledger.route(), ledger.analysis(), ledger.plan())
        else {
            return PhaseResult::Fatal(missing(PhaseName::Plan));
        };
        let models = analysis.model_refs();

        let gathered = match deps
            .registry
            .gather_prompt_contributions(
                &analysis.integrations,
                &analysis.app_name,
                &models,
                &analysis.auth_methods,
                &deps.store,
                deps.config.prompt_timeout,
            )
            .await
        {
            Ok(gathered) => gathered,
            Err(e) => return PhaseResult::Fatal(e.to_string()),
        };
        let mut warnings = gathered.warnings;

        let tools = match deps
            .registry
            .tool_servers(&analysis.integrations, &analysis.app_name, &deps.store)
        {
            Ok(tools) => tools,
            Err(e) => return PhaseResult::Fatal(e.to_string()),
        };
        warnings.extend(tools.warnings);

        let provisioning = if deps.config.auto_provision {
            Self::provision(analysis, &gathered.contributions, deps, &mut warnings).await
        } else {
            Vec::new()
        };

        let request = GenerationRequest {
            app_name: analysis.app_name.clone(),
            prompt: ctx.prompt.clone(),
            platform: route.platform,
            units: plan.paths(),
            system_fragments: gathered
                .contributions
                .iter()
                .filter_map(|c| c.system_fragment.clone())
                .collect(),
            user_fragments: gathered
                .contributions
                .iter()
                .filter_map(|c| c.user_fragment.clone())
                .collect(),
            mcp_servers: tools.servers,
            allowed_tools: tools.allowed_tools,
        };

        let report = match deps.coder.generate(&request).await {
            Ok(report) => report,
            Err(e @ ForgeError::Collaborator(_)) | Err(e @ ForgeError::Io(_)) => {
                return PhaseResult::Retry(format!("{} failed: {e}", deps.coder.name()))
            }
            Err(e) => return PhaseResult::Fatal(e.to_string()),
        };
        if report.generated.is_empty() {
            return PhaseResult::Retry("code agent generated no units".into());
        }

        let planned = plan.paths();
        let unplanned: Vec<&String> = report
            .generated
            .iter()
            .filter(|u| !planned.contains(u))
            .collect();
        if !unplanned.is_empty() {
            warnings.push(format!(
                "code agent wrote units outside the plan: {}",
                unplanned.iter().map(|u| u.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }

        info!(
            generated = report.generated.len(),
            invalid = report.invalid.len(),
            planned = planned.len(),
            "Generation finished"
        );
        PhaseResult::Continue(PhasePayload::Build(BuildOutput {
            generated: report.generated,
            invalid: report.invalid,
            contributions: gathered.contributions,
            provisioning,
            mcp_servers: request.mcp_servers.iter().map(|s| s.name.clone()).collect(),
            allowed_tools: request.allowed_tools,
            warnings,
        }))
    }
}
