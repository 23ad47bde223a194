//! Structured observability hooks for the AppForge pipeline.
//!
//! - A request-scoped span (`request_span`) for a whole pipeline run
//! - Emission functions for lifecycle events: pipeline, phases, fix loop, provisioning
//!
//! Field values are identifiers, counts and reasons. Credentials and tool
//! server environments are never passed to these functions.

use tracing::{info, warn};

/// Span tagging every event of one pipeline run with its request id.
///
/// Attach it with `tracing::Instrument` so it follows the future across awaits:
///
/// ```ignore
/// controller.drive(ctx).instrument(request_span("7f0c...")).await
/// ```
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("appforge.request", request_id = %request_id)
}

pub fn emit_pipeline_started(request_id: &str, app_name: Option<&str>) {
    info!(
        event = "pipeline.started",
        request_id = %request_id,
        app_name = app_name.unwrap_or("-"),
    );
}

pub fn emit_phase_started(phase: &str, attempt: u32) {
    info!(event = "phase.started", phase = %phase, attempt = attempt);
}

/// `outcome` is one of `continue`, `retry` or `fatal`.
pub fn emit_phase_finished(phase: &str, attempt: u32, outcome: &str, duration_ms: u64) {
    info!(
        event = "phase.finished",
        phase = %phase,
        attempt = attempt,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

pub fn emit_phase_retry(phase: &str, attempt: u32, reason: &str) {
    warn!(event = "phase.retry", phase = %phase, attempt = attempt, reason = %reason);
}

pub fn emit_fix_iteration(iteration: u32, tier: &str, units: usize, diagnostics: usize) {
    info!(
        event = "fix.iteration",
        iteration = iteration,
        tier = %tier,
        units = units,
        diagnostics = diagnostics,
    );
}

pub fn emit_fix_finished(mode: &str, outcome: &str, iterations: u32) {
    info!(
        event = "fix.finished",
        mode = %mode,
        outcome = %outcome,
        iterations = iterations,
    );
}

pub fn emit_provision_warning(provider: &str, warning: &str) {
    warn!(event = "provision.warning", provider = %provider, warning = %warning);
}

pub fn emit_capability_skipped(provider: &str, capability: &str, reason: &dyn std::fmt::Display) {
    warn!(
        event = "capability.skipped",
        provider = %provider,
        capability = %capability,
        reason = %reason,
    );
}

pub fn emit_pipeline_finished(request_id: &str, state: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        request_id = %request_id,
        state = %state,
        duration_ms = duration_ms,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_span_create() {
        let _guard = request_span("test-request-id").entered();
        emit_phase_started("route", 1);
        emit_phase_finished("route", 1, "continue", 3);
    }
}
