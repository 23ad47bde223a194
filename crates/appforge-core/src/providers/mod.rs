//! Backend integration providers and their optional capabilities.
//!
//! A [`Provider`] always exposes identity and metadata. Everything else is an
//! optional capability reached through a capability query
//! (`as_setup`, `as_prompt_contributor`, `as_mcp_server`, `as_provisioner`).
//! A `None` answer means the provider does not take part in that stage; it is
//! never an error.

pub mod integration;
pub mod registry;
pub mod revenuecat;
pub mod supabase;

use std::collections::BTreeMap;

use appforge_state::IntegrationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AuthMethod, ModelRef, Result};

pub use integration::{IntegrationInput, IntegrationService};
pub use registry::ProviderRegistry;

// ---------------------------------------------------------------------------
// Identity and metadata
// ---------------------------------------------------------------------------

/// Stable provider key (a slug such as `supabase`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        ProviderId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        ProviderId(s.to_string())
    }
}

/// Command template for the provider's external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolTemplate {
    pub command: String,
    pub args: Vec<String>,
}

/// Read-only provider metadata, fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: String,
    pub description: String,
    /// Client package the generated app depends on.
    pub package: String,
    pub tool: ToolTemplate,
    /// Package exposing the provider's documentation tool, if any.
    pub docs_package: Option<String>,
}

/// A pluggable backend integration.
pub trait Provider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn id(&self) -> &ProviderId {
        &self.descriptor().id
    }

    fn as_setup(&self) -> Option<&dyn SetupCapability> {
        None
    }

    fn as_prompt_contributor(&self) -> Option<&dyn PromptContributor> {
        None
    }

    fn as_mcp_server(&self) -> Option<&dyn McpServerCapability> {
        None
    }

    fn as_provisioner(&self) -> Option<&dyn Provisioner> {
        None
    }
}

// ---------------------------------------------------------------------------
// Setup / lifecycle
// ---------------------------------------------------------------------------

/// Validates and normalizes user-supplied integration settings.
pub trait SetupCapability: Send + Sync {
    /// Field names a setup request must supply.
    fn required_fields(&self) -> &'static [&'static str];

    /// Turn raw input into a normalized config (without `validated_at`).
    fn validate(&self, app_name: &str, input: &IntegrationInput) -> Result<IntegrationConfig>;

    /// Re-check a previously stored config.
    fn check(&self, config: &IntegrationConfig) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Prompt contribution
// ---------------------------------------------------------------------------

/// Input to a prompt contribution. Built by the registry from the analysis and the store.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub app_name: String,
    pub models: Vec<ModelRef>,
    pub auth_methods: Vec<AuthMethod>,
    pub config: Option<IntegrationConfig>,
}

/// Prompt fragments a provider adds to the code-generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContribution {
    pub provider_id: ProviderId,
    pub system_fragment: Option<String>,
    pub user_fragment: Option<String>,
    /// Backend resources for this app already exist.
    pub backend_ready: bool,
}

/// Contributes provider-specific guidance to generation prompts.
///
/// Must not write to any store and must return quickly; the registry bounds
/// each call with a short timeout.
#[async_trait]
pub trait PromptContributor: Send + Sync {
    async fn contribute(&self, request: &PromptRequest) -> Result<PromptContribution>;
}

// ---------------------------------------------------------------------------
// Tool-server exposure
// ---------------------------------------------------------------------------

/// Transient credentials used to launch a tool server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub project_ref: Option<String>,
}

impl Credentials {
    /// Credentials from a stored config, if it carries a personal access token.
    pub fn from_config(config: &IntegrationConfig) -> Option<Self> {
        config.pat.as_ref().map(|token| Credentials {
            token: token.clone(),
            project_ref: config.project_ref.clone(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("project_ref", &self.project_ref)
            .finish()
    }
}

/// Launch descriptor for an external tool (MCP) server.
///
/// `env` carries secrets: it is redacted from `Debug` and must never be logged.
/// It is serialized only when handed to the code agent that launches the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerDescriptor {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl std::fmt::Debug for McpServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
        f.debug_struct("McpServerDescriptor")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Fully-qualified tool name: `mcp__<server>__<tool>`.
pub fn qualified_tool(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// Exposes a tool server and the tools an agentic stage may call on it.
pub trait McpServerCapability: Send + Sync {
    fn mcp_server(&self, credentials: &Credentials) -> Result<McpServerDescriptor>;

    fn allowed_tools(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Desired backend resource shape.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub app_name: String,
    pub config: IntegrationConfig,
    pub needs_auth: bool,
    pub needs_database: bool,
    pub needs_storage: bool,
    pub needs_realtime: bool,
    pub auth_methods: Vec<AuthMethod>,
    pub models: Vec<ModelRef>,
}

/// What provisioning achieved. Partial success is reported through `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResult {
    pub tables_created: Vec<String>,
    /// A platform-level step (e.g. enabling a sign-in provider) is still required.
    pub needs_platform_setup: bool,
    pub warnings: Vec<String>,
}

impl ProvisionResult {
    pub fn partial(warning: impl Into<String>) -> Self {
        Self {
            warnings: vec![warning.into()],
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Creates backend resources. The only capability with external side effects.
///
/// Implementations must be idempotent per (app, provider), honor `deadline`
/// by returning a partial result with warnings, and prefer warnings over
/// failing the whole call. `Err` is reserved for unusable input.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        request: &ProvisionRequest,
        deadline: tokio::time::Instant,
    ) -> Result<ProvisionResult>;
}
