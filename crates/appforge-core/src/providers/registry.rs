//! Provider registry: identity lookup and capability dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use appforge_state::{IntegrationConfig, ProjectStore};
use futures::future::join_all;
use tracing::{debug, info};

use super::revenuecat::RevenueCatProvider;
use super::supabase::SupabaseProvider;
use super::{
    Credentials, McpServerCapability, McpServerDescriptor, PromptContribution, PromptContributor,
    PromptRequest, Provider, ProviderDescriptor, ProviderId, Provisioner, SetupCapability,
};
use crate::config::ForgeConfig;
use crate::domain::{AuthMethod, ForgeError, ModelRef, Result};
use crate::obs;

/// Registered providers, kept in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    index: HashMap<ProviderId, usize>,
}

/// Prompt contributions gathered from the selected providers.
#[derive(Debug, Clone, Default)]
pub struct GatheredPrompts {
    pub contributions: Vec<PromptContribution>,
    pub warnings: Vec<String>,
}

/// Tool servers and allowlisted tool names for the selected providers.
#[derive(Debug, Clone, Default)]
pub struct ToolServers {
    pub servers: Vec<McpServerDescriptor>,
    pub allowed_tools: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in providers. This is the only place they are registered.
    pub fn with_defaults(config: &ForgeConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(
            SupabaseProvider::new()?.with_retries(config.collaborator_retries),
        ))?;
        registry.register(Arc::new(RevenueCatProvider::new()))?;
        Ok(registry)
    }

    /// Add a provider. Duplicate ids are a configuration error.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        let id = provider.id().clone();
        if self.index.contains_key(&id) {
            return Err(ForgeError::DuplicateProvider(id.to_string()));
        }
        debug!(provider = %id, "Registering provider");
        self.index.insert(id, self.providers.len());
        self.providers.push(provider);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Result<&Arc<dyn Provider>> {
        self.get(id)
            .ok_or_else(|| ForgeError::ProviderNotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.index
            .get(&ProviderId::from(id))
            .map(|&i| &self.providers[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(&ProviderId::from(id))
    }

    /// Descriptors in registration order.
    pub fn all(&self) -> Vec<&ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn setup_capable(&self) -> impl Iterator<Item = (&ProviderId, &dyn SetupCapability)> + '_ {
        self.providers
            .iter()
            .filter_map(|p| p.as_setup().map(|cap| (p.id(), cap)))
    }

    pub fn prompt_contributors(
        &self,
    ) -> impl Iterator<Item = (&ProviderId, &dyn PromptContributor)> + '_ {
        self.providers
            .iter()
            .filter_map(|p| p.as_prompt_contributor().map(|cap| (p.id(), cap)))
    }

    pub fn mcp_servers(&self) -> impl Iterator<Item = (&ProviderId, &dyn McpServerCapability)> + '_ {
        self.providers
            .iter()
            .filter_map(|p| p.as_mcp_server().map(|cap| (p.id(), cap)))
    }

    pub fn provisioners(&self) -> impl Iterator<Item = (&ProviderId, &dyn Provisioner)> + '_ {
        self.providers
            .iter()
            .filter_map(|p| p.as_provisioner().map(|cap| (p.id(), cap)))
    }

    /// Resolve selected ids, failing on the first unknown one.
    pub fn resolve(&self, selected: &[ProviderId]) -> Result<Vec<&Arc<dyn Provider>>> {
        selected.iter().map(|id| self.lookup(id.as_str())).collect()
    }

    /// Ask every selected contributor for prompt fragments, concurrently.
    ///
    /// Each call is bounded by `timeout`; a contributor that errors or times
    /// out is skipped with a warning. Results keep selection order.
    pub async fn gather_prompt_contributions(
        &self,
        selected: &[ProviderId],
        app_name: &str,
        models: &[ModelRef],
        auth_methods: &[AuthMethod],
        store: &ProjectStore,
        timeout: Duration,
    ) -> Result<GatheredPrompts> {
        let mut gathered = GatheredPrompts::default();
        let mut jobs: Vec<(ProviderId, &dyn PromptContributor, PromptRequest)> = Vec::new();

        for provider in self.resolve(selected)? {
            let Some(contributor) = provider.as_prompt_contributor() else {
                continue;
            };
            let config = stored_config(store, provider.id(), app_name, &mut gathered.warnings);
            jobs.push((
                provider.id().clone(),
                contributor,
                PromptRequest {
                    app_name: app_name.to_string(),
                    models: models.to_vec(),
                    auth_methods: auth_methods.to_vec(),
                    config,
                },
            ));
        }

        let calls = jobs.iter().map(|(id, contributor, request)| async move {
            let outcome = tokio::time::timeout(timeout, contributor.contribute(request)).await;
            (id, outcome)
        });

        for (id, outcome) in join_all(calls).await {
            match outcome {
                Ok(Ok(contribution)) => gathered.contributions.push(contribution),
                Ok(Err(e)) => {
                    obs::emit_capability_skipped(id.as_str(), "prompt", &e);
                    gathered
                        .warnings
                        .push(format!("{id}: prompt contribution failed: {e}"));
                }
                Err(_) => {
                    let reason = format!("timed out after {}ms", timeout.as_millis());
                    obs::emit_capability_skipped(id.as_str(), "prompt", &reason);
                    gathered
                        .warnings
                        .push(format!("{id}: prompt contribution {reason}"));
                }
            }
        }

        info!(
            contributions = gathered.contributions.len(),
            skipped = gathered.warnings.len(),
            "Gathered prompt contributions"
        );
        Ok(gathered)
    }

    /// Tool server descriptors and allowlists for the selected providers.
    ///
    /// Providers without stored credentials are skipped with a warning.
    pub fn tool_servers(
        &self,
        selected: &[ProviderId],
        app_name: &str,
        store: &ProjectStore,
    ) -> Result<ToolServers> {
        let mut out = ToolServers::default();

        for provider in self.resolve(selected)? {
            let Some(capability) = provider.as_mcp_server() else {
                continue;
            };
            let id = provider.id();
            let credentials = stored_config(store, id, app_name, &mut out.warnings)
                .as_ref()
                .and_then(Credentials::from_config);
            let Some(credentials) = credentials else {
                out.warnings
                    .push(format!("{id}: no access token configured; tool server skipped"));
                continue;
            };
            match capability.mcp_server(&credentials) {
                Ok(server) => {
                    out.servers.push(server);
                    out.allowed_tools.extend(capability.allowed_tools());
                }
                Err(e) => {
                    obs::emit_capability_skipped(id.as_str(), "mcp_server", &e);
                    out.warnings.push(format!("{id}: tool server unavailable: {e}"));
                }
            }
        }

        Ok(out)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.providers.iter().map(|p| p.id().as_str()).collect();
        f.debug_struct("ProviderRegistry").field("providers", &ids).finish()
    }
}

/// Stored config for a provider/app pair. Store read errors degrade to `None`.
pub(crate) fn stored_config(
    store: &ProjectStore,
    id: &ProviderId,
    app_name: &str,
    warnings: &mut Vec<String>,
) -> Option<IntegrationConfig> {
    match store.integrations().get(id.as_str(), app_name) {
        Ok(config) => config,
        Err(e) => {
            warnings.push(format!("{id}: could not read integration config: {e}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolTemplate;

    struct Bare(ProviderDescriptor);

    impl Provider for Bare {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.0
        }
    }

    fn bare(id: &str) -> Arc<dyn Provider> {
        Arc::new(Bare(ProviderDescriptor {
            id: ProviderId::from(id),
            display_name: id.to_uppercase(),
            description: String::new(),
            package: String::new(),
            tool: ToolTemplate {
                command: "true".into(),
                args: vec![],
            },
            docs_package: None,
        }))
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut registry = ProviderRegistry::new();
        registry.register(bare("b")).unwrap();
        registry.register(bare("a")).unwrap();
        let ids: Vec<_> = registry.all().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_bare_provider_has_no_capabilities() {
        let mut registry = ProviderRegistry::new();
        registry.register(bare("plain")).unwrap();
        assert_eq!(registry.setup_capable().count(), 0);
        assert_eq!(registry.prompt_contributors().count(), 0);
        assert_eq!(registry.mcp_servers().count(), 0);
        assert_eq!(registry.provisioners().count(), 0);
    }

    #[test]
    fn test_defaults_register_builtin_providers() {
        let registry = ProviderRegistry::with_defaults(&ForgeConfig::default()).unwrap();
        assert!(registry.contains("supabase"));
        assert!(registry.contains("revenuecat"));
        assert_eq!(registry.provisioners().count(), 1);
        assert_eq!(registry.mcp_servers().count(), 2);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve(&[ProviderId::from("nope")]).err().expect("expected resolve to fail");
        assert!(matches!(err, ForgeError::ProviderNotFound(id) if id == "nope"));
    }
}
