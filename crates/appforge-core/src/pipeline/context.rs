//! Per-request input and the shared context every phase reads.

use appforge_state::HistoryEntry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::PhaseName;
use crate::domain::Hints;

/// A user's generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub prompt: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub hints: Hints,
}

impl BuildRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            app_name: None,
            hints: Hints::default(),
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }
}

/// Read-only request state shared across phases. The controller appends
/// retry reasons between attempts; phases never mutate it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub prompt: String,
    pub app_name: Option<String>,
    pub hints: Hints,
    pub retry_reasons: Vec<(PhaseName, String)>,
    /// Recent history, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl RequestContext {
    pub fn new(request: BuildRequest, history: Vec<HistoryEntry>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            prompt: request.prompt,
            app_name: request.app_name,
            hints: request.hints,
            retry_reasons: Vec::new(),
            history,
        }
    }

    pub(crate) fn push_retry(&mut self, phase: PhaseName, reason: String) {
        self.retry_reasons.push((phase, reason));
    }

    /// Reasons earlier attempts of `phase` were retried, oldest first.
    pub fn retries_for(&self, phase: PhaseName) -> Vec<&str> {
        self.retry_reasons
            .iter()
            .filter(|(p, _)| *p == phase)
            .map(|(_, reason)| reason.as_str())
            .collect()
    }

    /// History rendered as `role: content` lines for agent context.
    pub fn history_lines(&self) -> Vec<String> {
        self.history
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect()
    }

    /// Text appended to a prompt so the agent can correct a rejected answer.
    pub fn retry_note(&self, phase: PhaseName) -> String {
        let reasons = self.retries_for(phase);
        if reasons.is_empty() {
            return String::new();
        }
        let mut note = String::from("\n\nYour previous answer was rejected:");
        for reason in reasons {
            note.push_str("\n- ");
            note.push_str(reason);
        }
        note.push_str("\nAnswer again with valid JSON only.");
        note
    }
}
