//! External agent collaborators: a reasoning agent for routing, analysis and
//! planning, and a code agent that writes units and applies fixes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Platform, Result};
use crate::fixloop::{FixAction, Fixer};
use crate::providers::McpServerDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTask {
    Route,
    Analyze,
    Plan,
}

/// A single structured question for the reasoning agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task: AgentTask,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Prior conversation, oldest first, rendered as `role: content` lines.
    pub context: Vec<String>,
}

/// Raw answer. Phases parse `content` as JSON and treat a parse failure as
/// a contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
}

#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &AgentRequest) -> Result<AgentResponse>;
}

/// Everything the code agent needs to write the planned units.
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub app_name: String,
    pub prompt: String,
    pub platform: Platform,
    /// Planned unit paths, in plan order.
    pub units: Vec<String>,
    pub system_fragments: Vec<String>,
    pub user_fragments: Vec<String>,
    pub mcp_servers: Vec<McpServerDescriptor>,
    pub allowed_tools: Vec<String>,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("app_name", &self.app_name)
            .field("platform", &self.platform)
            .field("units", &self.units)
            .field("system_fragments", &self.system_fragments.len())
            .field("user_fragments", &self.user_fragments.len())
            .field("mcp_servers", &self.mcp_servers)
            .field("allowed_tools", &self.allowed_tools)
            .finish()
    }
}

/// Which units the code agent wrote, and which it knows to be broken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated: Vec<String>,
    #[serde(default)]
    pub invalid: Vec<String>,
}

#[async_trait]
pub trait CodeAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReport>;

    async fn apply_fix(&self, action: &FixAction) -> Result<()>;
}

/// Lets the build-fix loop drive a [`CodeAgent`] as its [`Fixer`].
pub struct AgentFixer<'a>(pub &'a dyn CodeAgent);

#[async_trait]
impl Fixer for AgentFixer<'_> {
    async fn apply_fix(&self, action: &FixAction) -> Result<()> {
        self.0.apply_fix(action).await
    }
}

/// Parse a JSON reply, tolerating a fenced ```json block around it.
pub fn parse_reply<T: serde::de::DeserializeOwned>(content: &str) -> serde_json::Result<T> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}
