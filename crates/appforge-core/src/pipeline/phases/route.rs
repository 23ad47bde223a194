//! Route: pick the target platform and operation.
//!
//! Local keyword rules run first. The reasoning agent is only asked when the
//! rules find no platform or more than one.

use std::collections::BTreeSet;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ask;
use crate::domain::{Operation, Platform};
use crate::pipeline::agent::AgentTask;
use crate::pipeline::context::RequestContext;
use crate::pipeline::controller::PipelineDeps;
use crate::pipeline::phase::{Phase, PhaseLedger, PhaseName, PhasePayload, PhaseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Hint,
    Rules,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub platform: Platform,
    pub operation: Operation,
    pub source: RouteSource,
}

const PLATFORM_KEYWORDS: &[(Platform, &str)] = &[
    (Platform::Ios, r"iphone|ios"),
    (Platform::Ipados, r"ipad|ipados"),
    (Platform::Macos, r"mac|macos|macbook|menu ?bar app"),
    (Platform::Watchos, r"apple watch|watchos|wrist"),
    (Platform::Tvos, r"apple tv|tvos"),
    (Platform::Visionos, r"vision pro|visionos|spatial"),
];

const FIX_KEYWORDS: &str = r"fix|broken|crash(es|ing)?|does ?n[o']t (build|compile)";
const EDIT_KEYWORDS: &str = r"add|change|update|modify|edit|rename|remove";

/// Word-boundary keyword rules for platform and operation.
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    platforms: Vec<(Platform, Regex)>,
    fix: Regex,
    edit: Regex,
}

fn word_regex(alternatives: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
}

impl KeywordRouter {
    pub fn new() -> Result<Self, regex::Error> {
        let platforms = PLATFORM_KEYWORDS
            .iter()
            .map(|(p, kw)| word_regex(kw).map(|re| (*p, re)))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            platforms,
            fix: word_regex(FIX_KEYWORDS)?,
            edit: word_regex(EDIT_KEYWORDS)?,
        })
    }

    /// Every platform the prompt mentions.
    pub fn platforms(&self, prompt: &str) -> BTreeSet<Platform> {
        self.platforms
            .iter()
            .filter(|(_, re)| re.is_match(prompt))
            .map(|(p, _)| *p)
            .collect()
    }

    /// Fix wins over edit; anything else is a new app.
    pub fn operation(&self, prompt: &str) -> Operation {
        if self.fix.is_match(prompt) {
            Operation::Fix
        } else if self.edit.is_match(prompt) {
            Operation::Edit
        } else {
            Operation::Create
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteReply {
    platform: Platform,
    #[serde(default)]
    operation: Option<Operation>,
}

const SYSTEM_PROMPT: &str = "You route app-generation requests for Apple platforms. \
Reply with JSON only: {\"platform\": one of ios|ipados|macos|watchos|tvos|visionos, \
\"operation\": one of create|edit|fix}.";

pub struct RoutePhase {
    router: Option<KeywordRouter>,
}

impl RoutePhase {
    pub fn new() -> Self {
        Self {
            router: KeywordRouter::new().ok(),
        }
    }
}

impl Default for RoutePhase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Phase for RoutePhase {
    fn name(&self) -> PhaseName {
        PhaseName::Route
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        _ledger: &PhaseLedger,
        deps: &PipelineDeps,
    ) -> PhaseResult<PhasePayload> {
        let Some(router) = &self.router else {
            return PhaseResult::Fatal("keyword router failed to initialise".into());
        };
        let operation = ctx
            .hints
            .operation
            .unwrap_or_else(|| router.operation(&ctx.prompt));

        if let Some(platform) = ctx.hints.platform {
            return PhaseResult::Continue(PhasePayload::Route(RouteDecision {
                platform,
                operation,
                source: RouteSource::Hint,
            }));
        }

        let candidates = router.platforms(&ctx.prompt);
        if candidates.len() == 1 {
            if let Some(&platform) = candidates.iter().next() {
                debug!(platform = %platform, "Routed by keyword rules");
                return PhaseResult::Continue(PhasePayload::Route(RouteDecision {
                    platform,
                    operation,
                    source: RouteSource::Rules,
                }));
            }
        }

        let mut user = format!("Request: {}", ctx.prompt);
        if !candidates.is_empty() {
            let names: Vec<&str> = candidates.iter().map(Platform::as_str).collect();
            user.push_str(&format!("\nThe request mentions several platforms: {}.", names.join(", ")));
        }
        match ask::<RouteReply>(deps, ctx, PhaseName::Route, AgentTask::Route, SYSTEM_PROMPT, user).await {
            Ok(reply) => PhaseResult::Continue(PhasePayload::Route(RouteDecision {
                platform: reply.platform,
                operation: ctx.hints.operation.or(reply.operation).unwrap_or(operation),
                source: RouteSource::Agent,
            })),
            Err(reason) => PhaseResult::Retry(reason),
        }
    }
}
