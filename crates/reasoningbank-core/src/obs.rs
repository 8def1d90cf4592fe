//! Structured lifecycle events.
//!
//! Every event is an `info!`/`warn!` record with an `event` field, so a JSON
//! subscriber (see [`crate::telemetry`]) yields one machine-readable line per
//! transition.

use tracing::{debug, info, warn};

use crate::layers::Layer;

/// Run-scoped span; attach it to the run's future with
/// `tracing::Instrument` so every event inside carries `run_id`.
///
/// ```ignore
/// async { /* steps */ }.instrument(run_span("3f0c...")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("rbank.run", run_id = %run_id)
}

/// RAII guard entering a run-scoped span for synchronous sections.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, task: &str, context_chars: usize) {
    info!(event = "run.started", run_id = %run_id, task = %task, context_chars = context_chars);
}

pub fn emit_run_finished(run_id: &str, iterations: usize, converged: bool, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        iterations = iterations,
        converged = converged,
        duration_ms = duration_ms,
    );
}

/// A tool call completed. Large returns are logged at `warn` because they
/// mean a tool leaked a payload instead of a handle.
pub fn emit_tool_called(tool: &str, return_chars: usize, large: bool, ok: bool) {
    if large {
        warn!(event = "tool.large_return", tool = %tool, return_chars = return_chars);
    } else {
        debug!(event = "tool.called", tool = %tool, return_chars = return_chars, ok = ok);
    }
}

pub fn emit_layer_packed(layer: Layer, chars: usize, budget: usize) {
    debug!(event = "context.layer_packed", layer = %layer, chars = chars, budget = budget);
}

/// Closed-loop stage transition (`judged`, `extracted`, `stored`, `skipped`).
pub fn emit_loop_stage(task: &str, stage: &str, detail: &str) {
    info!(event = "loop.stage", task = %task, stage = %stage, detail = %detail);
}

pub fn emit_loop_error(task: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "loop.error", task = %task, stage = %stage, error = %error);
}
