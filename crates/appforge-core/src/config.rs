//! Runtime configuration for the pipeline.
//!
//! Defaults are tuned for interactive use. `ForgeConfig::from_env` overlays
//! `APPFORGE_*` variables; the CLI overlays its own flags on top of that.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pipeline and build-fix loop limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Maximum compiler invocations per build-fix run.
    pub max_fix_iterations: u32,

    /// Retries allowed per phase before a `Retry` becomes fatal.
    pub phase_retry_ceiling: u32,

    /// Extra attempts for a failing external collaborator call.
    pub collaborator_retries: u32,

    /// Upper bound for a single provider prompt contribution.
    #[serde(with = "duration_ms")]
    pub prompt_timeout: Duration,

    /// Deadline handed to provisioning calls.
    #[serde(with = "duration_ms")]
    pub provision_timeout: Duration,

    /// Whether the build phase provisions backend resources.
    pub auto_provision: bool,

    /// Lines from the top of a unit inspected by the structural heuristic.
    pub structural_window: u32,

    /// Scope diagnostics within the window that mark a unit as structurally broken.
    pub structural_threshold: usize,

    /// History entries handed to the reasoning agent as context.
    pub history_context: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            max_fix_iterations: 8,
            phase_retry_ceiling: 2,
            collaborator_retries: 2,
            prompt_timeout: Duration::from_secs(2),
            provision_timeout: Duration::from_secs(60),
            auto_provision: true,
            structural_window: 20,
            structural_threshold: 3,
            history_context: 10,
        }
    }
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with any `APPFORGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from a key lookup. Unparseable values are ignored with a warning.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable config value");
                    None
                }
            }
        }

        let key = "APPFORGE_MAX_FIX_ITERATIONS";
        if let Some(v) = parse(key, lookup(key)) {
            self.max_fix_iterations = v;
        }
        let key = "APPFORGE_PHASE_RETRY_CEILING";
        if let Some(v) = parse(key, lookup(key)) {
            self.phase_retry_ceiling = v;
        }
        let key = "APPFORGE_COLLABORATOR_RETRIES";
        if let Some(v) = parse(key, lookup(key)) {
            self.collaborator_retries = v;
        }
        let key = "APPFORGE_PROMPT_TIMEOUT_MS";
        if let Some(v) = parse::<u64>(key, lookup(key)) {
            self.prompt_timeout = Duration::from_millis(v);
        }
        let key = "APPFORGE_PROVISION_TIMEOUT_SECS";
        if let Some(v) = parse::<u64>(key, lookup(key)) {
            self.provision_timeout = Duration::from_secs(v);
        }
        let key = "APPFORGE_AUTO_PROVISION";
        if let Some(v) = parse(key, lookup(key)) {
            self.auto_provision = v;
        }
        self
    }

    pub fn with_max_fix_iterations(mut self, max: u32) -> Self {
        self.max_fix_iterations = max;
        self
    }

    pub fn with_phase_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.phase_retry_ceiling = ceiling;
        self
    }

    pub fn with_collaborator_retries(mut self, retries: u32) -> Self {
        self.collaborator_retries = retries;
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    pub fn with_auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision = enabled;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
