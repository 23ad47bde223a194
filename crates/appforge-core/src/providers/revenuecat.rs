//! RevenueCat in-app purchase provider.
//!
//! Setup, prompt guidance and a tool server. Products and entitlements are
//! managed in the RevenueCat dashboard, so there is nothing to provision.

use appforge_state::IntegrationConfig;
use async_trait::async_trait;

use super::{
    qualified_tool, Credentials, IntegrationInput, McpServerCapability, McpServerDescriptor,
    PromptContribution, PromptContributor, PromptRequest, Provider, ProviderDescriptor,
    ProviderId, SetupCapability, ToolTemplate,
};
use crate::domain::{ForgeError, Result};

pub const PROVIDER_ID: &str = "revenuecat";
const DASHBOARD_URL: &str = "https://app.revenuecat.com/projects";
const MCP_PACKAGE: &str = "@revenuecat/mcp-server@latest";
const TOOLS: &[&str] = &["list_products", "list_entitlements", "list_offerings", "get_project"];

pub struct RevenueCatProvider {
    descriptor: ProviderDescriptor,
}

impl RevenueCatProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id: ProviderId::from(PROVIDER_ID),
                display_name: "RevenueCat".into(),
                description: "In-app purchases and subscriptions".into(),
                package: "https://github.com/RevenueCat/purchases-ios".into(),
                tool: ToolTemplate {
                    command: "npx".into(),
                    args: vec!["-y".into(), MCP_PACKAGE.into()],
                },
                docs_package: None,
            },
        }
    }
}

impl Default for RevenueCatProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for RevenueCatProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn as_setup(&self) -> Option<&dyn SetupCapability> {
        Some(self)
    }

    fn as_prompt_contributor(&self) -> Option<&dyn PromptContributor> {
        Some(self)
    }

    fn as_mcp_server(&self) -> Option<&dyn McpServerCapability> {
        Some(self)
    }
}

impl SetupCapability for RevenueCatProvider {
    fn required_fields(&self) -> &'static [&'static str] {
        &["project_id", "api_key", "secret_key"]
    }

    /// `api_key` is the public SDK key; `secret_key` is only used by the tool server.
    fn validate(&self, app_name: &str, input: &IntegrationInput) -> Result<IntegrationConfig> {
        let project_id = input.require("project_id")?;
        if !project_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ForgeError::InvalidIntegration(format!(
                "project id must be alphanumeric: {project_id}"
            )));
        }
        let api_key = input.require("api_key")?;
        if !api_key.starts_with("appl_") {
            return Err(ForgeError::InvalidIntegration(
                "api_key must be an Apple public SDK key (appl_...)".into(),
            ));
        }

        Ok(IntegrationConfig {
            provider_id: PROVIDER_ID.to_string(),
            app_name: app_name.to_string(),
            project_url: format!("{DASHBOARD_URL}/{project_id}"),
            anon_key: api_key.to_string(),
            pat: Some(input.require("secret_key")?.to_string()),
            project_ref: Some(project_id.to_string()),
            validated_at: None,
        })
    }

    fn check(&self, config: &IntegrationConfig) -> Result<()> {
        if !config.anon_key.starts_with("appl_") {
            return Err(ForgeError::InvalidIntegration("stored SDK key is not an Apple key".into()));
        }
        if config.project_ref.is_none() {
            return Err(ForgeError::InvalidIntegration("project id is missing".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PromptContributor for RevenueCatProvider {
    async fn contribute(&self, request: &PromptRequest) -> Result<PromptContribution> {
        let system = "Purchases: RevenueCat via the purchases-ios package (`import RevenueCat`). \
                      Call `Purchases.configure(withAPIKey:)` once at launch, present offerings \
                      from `Purchases.shared.offerings()`, and gate premium features on \
                      `customerInfo.entitlements`."
            .to_string();
        let user = match &request.config {
            Some(config) => format!("RevenueCat public SDK key: {}", config.anon_key),
            None => "RevenueCat is not configured for this app yet; use a placeholder SDK key \
                     constant named `revenueCatAPIKey`."
                .to_string(),
        };

        Ok(PromptContribution {
            provider_id: ProviderId::from(PROVIDER_ID),
            system_fragment: Some(system),
            user_fragment: Some(user),
            backend_ready: request
                .config
                .as_ref()
                .is_some_and(|c| c.validated_at.is_some()),
        })
    }
}

impl McpServerCapability for RevenueCatProvider {
    fn mcp_server(&self, credentials: &Credentials) -> Result<McpServerDescriptor> {
        let mut args = self.descriptor.tool.args.clone();
        if let Some(project) = &credentials.project_ref {
            args.push(format!("--project-id={project}"));
        }
        Ok(McpServerDescriptor {
            name: PROVIDER_ID.to_string(),
            command: self.descriptor.tool.command.clone(),
            args,
            env: [("REVENUECAT_API_KEY".to_string(), credentials.token.clone())]
                .into_iter()
                .collect(),
        })
    }

    fn allowed_tools(&self) -> Vec<String> {
        TOOLS.iter().map(|t| qualified_tool(PROVIDER_ID, t)).collect()
    }
}
