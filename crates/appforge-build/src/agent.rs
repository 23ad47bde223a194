//! Agent adapter for an external command.
//!
//! Each call spawns the command once, writes one JSON message to its stdin
//! and reads the reply from stdout:
//!
//! | `kind`      | payload field | expected stdout                    |
//! |-------------|---------------|------------------------------------|
//! | `complete`  | `request`     | `{"content": ...}` or plain text   |
//! | `generate`  | `request`     | `{"generated": [...], "invalid": [...]}` |
//! | `apply_fix` | `action`      | ignored; exit status decides       |

use appforge_core::pipeline::agent::parse_reply;
use appforge_core::{
    AgentRequest, AgentResponse, CodeAgent, FixAction, GenerationReport, GenerationRequest,
    ReasoningAgent, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BuildError;
use crate::runner::{ProcessOutput, ProcessRunner};
use crate::stage::CommandSpec;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AgentMessage<'a> {
    Complete { request: &'a AgentRequest },
    Generate { request: &'a GenerationRequest },
    ApplyFix { action: &'a FixAction },
}

impl AgentMessage<'_> {
    fn kind(&self) -> &'static str {
        match self {
            AgentMessage::Complete { .. } => "complete",
            AgentMessage::Generate { .. } => "generate",
            AgentMessage::ApplyFix { .. } => "apply_fix",
        }
    }
}

#[derive(Deserialize)]
struct CompleteReply {
    content: String,
}

/// Serves both agent roles through one external command.
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    spec: CommandSpec,
}

impl ProcessAgent {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    async fn exchange(&self, message: &AgentMessage<'_>) -> std::result::Result<ProcessOutput, BuildError> {
        let input = serde_json::to_vec(message)?;
        debug!(agent = %self.spec.name, kind = message.kind(), bytes = input.len(), "Calling agent");

        let output = ProcessRunner::execute_with_input(&self.spec, Some(input))
            .await
            .map_err(|e| match e.downcast::<BuildError>() {
                Ok(build) => build,
                Err(other) => BuildError::Protocol {
                    name: self.spec.name.clone(),
                    reason: format!("{other:#}"),
                },
            })?;
        if !output.passed() {
            return Err(BuildError::Exit {
                name: self.spec.name.clone(),
                code: output.exit_code,
                stderr: output.last_line().to_string(),
            });
        }
        Ok(output)
    }

    fn protocol_error(&self, reason: impl std::fmt::Display) -> BuildError {
        BuildError::Protocol {
            name: self.spec.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ReasoningAgent for ProcessAgent {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn complete(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let output = self.exchange(&AgentMessage::Complete { request }).await?;
        // Agents that answer with bare text are passed through; phases parse it.
        let content = match parse_reply::<CompleteReply>(&output.stdout) {
            Ok(reply) => reply.content,
            Err(_) => output.stdout.trim().to_string(),
        };
        if content.is_empty() {
            return Err(self.protocol_error("empty answer").into());
        }
        Ok(AgentResponse { content })
    }
}

#[async_trait]
impl CodeAgent for ProcessAgent {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReport> {
        let output = self.exchange(&AgentMessage::Generate { request }).await?;
        parse_reply(&output.stdout).map_err(|e| self.protocol_error(e).into())
    }

    async fn apply_fix(&self, action: &FixAction) -> Result<()> {
        self.exchange(&AgentMessage::ApplyFix { action }).await?;
        Ok(())
    }
}
