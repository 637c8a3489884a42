//! Prometheus metrics
//!
//! All metrics live in the default registry and are exposed in text format
//! at `GET /metrics` through [`gather`].

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished turns by outcome.
    ///
    /// Labels:
    /// - outcome: "completed", "pending_approval", "iteration_limit",
    ///   "upstream_error", "timeout"
    pub static ref TURNS: IntCounterVec = register_int_counter_vec!(
        "datavisor_turns_total",
        "Agent turns by outcome",
        &["outcome"]
    ).expect("failed to register TURNS metric");

    /// AGENT steps taken per turn.
    pub static ref TURN_ITERATIONS: Histogram = register_histogram!(
        "datavisor_turn_iterations",
        "AGENT steps per turn",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 25.0]
    ).expect("failed to register TURN_ITERATIONS metric");

    /// Tool calls requested by the model.
    ///
    /// Labels:
    /// - tool: tool name, or "invalid" when the call could not be parsed
    /// - mode: "auto" or "approval"
    pub static ref TOOL_CALLS: IntCounterVec = register_int_counter_vec!(
        "datavisor_tool_calls_total",
        "Tool calls requested by the model",
        &["tool", "mode"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Duration of one streamed LLM call, first byte to final chunk.
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "datavisor_llm_call_duration_seconds",
        "Streaming LLM call duration",
        &["model"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Sandbox Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Approved executions by status.
    ///
    /// Labels:
    /// - status: "success", "error" (fatal error in user code),
    ///   "provision_failed", "failed"
    pub static ref SANDBOX_EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "datavisor_sandbox_executions_total",
        "Sandbox executions by status",
        &["status"]
    ).expect("failed to register SANDBOX_EXECUTIONS metric");

    /// Wall time of one orchestrator call, provisioning to teardown.
    pub static ref SANDBOX_DURATION: Histogram = register_histogram!(
        "datavisor_sandbox_duration_seconds",
        "Sandbox execution duration",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register SANDBOX_DURATION metric");

    pub static ref GENERATED_FILES: IntCounter = register_int_counter!(
        "datavisor_generated_files_total",
        "Files collected from sandbox runs"
    ).expect("failed to register GENERATED_FILES metric");

    /// Generated files left behind because of the size ceilings.
    pub static ref GENERATED_FILES_SKIPPED: IntCounter = register_int_counter!(
        "datavisor_generated_files_skipped_total",
        "Generated files skipped by size ceilings"
    ).expect("failed to register GENERATED_FILES_SKIPPED metric");

    pub static ref SANDBOX_TEARDOWN_FAILURES: IntCounter = register_int_counter!(
        "datavisor_sandbox_teardown_failures_total",
        "Sandbox kill requests that failed"
    ).expect("failed to register SANDBOX_TEARDOWN_FAILURES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // HTTP Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    pub static ref RATE_LIMITED: IntCounter = register_int_counter!(
        "datavisor_rate_limited_total",
        "Requests rejected by the rate limiter"
    ).expect("failed to register RATE_LIMITED metric");
}

/// Encode every registered metric in the Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
