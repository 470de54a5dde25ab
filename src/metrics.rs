//! Prometheus metrics for the agent loop and tool adapters
//!
//! Everything registers into the default prometheus registry; [`render`]
//! produces the text exposition format shown by the `/metrics` command.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Loop
    // ─────────────────────────────────────────────────────────────────────────────

    /// Completed chat turns by outcome.
    ///
    /// Labels:
    /// - outcome: "success", "max_iterations", "transport_error", "protocol_error"
    pub static ref AGENT_TASKS: IntCounterVec = register_int_counter_vec!(
        "codecanvas_agent_tasks_total",
        "Agent chat turns by outcome",
        &["outcome"]
    ).expect("failed to register AGENT_TASKS metric");

    /// Model calls needed per chat turn.
    pub static ref AGENT_ITERATIONS_TOTAL: Histogram = register_histogram!(
        "codecanvas_agent_iterations",
        "Model calls per agent chat turn",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0]
    ).expect("failed to register AGENT_ITERATIONS_TOTAL metric");

    /// Tool invocations by tool name and outcome ("success" or an error kind).
    pub static ref AGENT_TOOL_CALLS: IntCounterVec = register_int_counter_vec!(
        "codecanvas_agent_tool_calls_total",
        "Tool invocations requested by the model",
        &["tool", "outcome"]
    ).expect("failed to register AGENT_TOOL_CALLS metric");

    /// Model gateway round-trip latency.
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "codecanvas_llm_call_seconds",
        "Model gateway round-trip latency in seconds",
        &["model"],
        vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
    ).expect("failed to register LLM_CALL_TIME metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Code Execution
    // ─────────────────────────────────────────────────────────────────────────────

    /// Code executions by language and status.
    ///
    /// Labels:
    /// - language: "python", "javascript", "java", "cpp"
    /// - status: "success", "error", "compile_error", "timeout", "failed"
    pub static ref CODE_EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "codecanvas_code_executions_total",
        "Code executions by language and status",
        &["language", "status"]
    ).expect("failed to register CODE_EXECUTIONS metric");

    /// Wall-clock execution time including any compile step.
    pub static ref CODE_EXECUTION_DURATION_TOTAL: HistogramVec = register_histogram_vec!(
        "codecanvas_code_execution_seconds",
        "Code execution wall-clock time in seconds",
        &["language"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("failed to register CODE_EXECUTION_DURATION_TOTAL metric");
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
