//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the orchestration phases
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all QueryForge metrics
pub const METRICS_PREFIX: &str = "queryforge";

/// Histogram buckets for LLM-bound phases (in seconds)
pub const PHASE_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Orchestration runs
    describe_counter!(
        format!("{}_orchestrations_total", METRICS_PREFIX),
        Unit::Count,
        "Total orchestration runs by resolved confidence"
    );

    describe_histogram!(
        format!("{}_orchestration_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end orchestration latency in seconds"
    );

    // Decision engine
    describe_histogram!(
        format!("{}_decision_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Tool decision latency in seconds"
    );

    describe_counter!(
        format!("{}_decision_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Decisions replaced by a deterministic fallback"
    );

    // Tool execution
    describe_counter!(
        format!("{}_tool_executions_total", METRICS_PREFIX),
        Unit::Count,
        "Tool calls by tool and terminal status"
    );

    describe_histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Tool handler latency in seconds"
    );

    // Synthesis
    describe_histogram!(
        format!("{}_synthesis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer synthesis latency in seconds"
    );

    describe_counter!(
        format!("{}_synthesis_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Synthesis calls that fell back to raw tool output or apology"
    );

    // LLM
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM API requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM request latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time one orchestration phase
pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    /// Start timing
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds since start
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Elapsed seconds since start
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Helper to record a finished orchestration run
pub fn record_orchestration(duration_secs: f64, confidence: &str) {
    counter!(
        format!("{}_orchestrations_total", METRICS_PREFIX),
        "confidence" => confidence.to_string()
    )
    .increment(1);

    histogram!(format!("{}_orchestration_duration_seconds", METRICS_PREFIX))
        .record(duration_secs);
}

/// Helper to record decision metrics
pub fn record_decision(duration_secs: f64, fallback_reason: Option<&str>) {
    histogram!(format!("{}_decision_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if let Some(reason) = fallback_reason {
        counter!(
            format!("{}_decision_fallbacks_total", METRICS_PREFIX),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a tool call reaching a terminal status
pub fn record_tool_execution(tool: &str, status: &str, duration_secs: f64) {
    counter!(
        format!("{}_tool_executions_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .record(duration_secs);
}

/// Helper to record synthesis metrics
pub fn record_synthesis(duration_secs: f64, mode: &str, fell_back: bool) {
    histogram!(
        format!("{}_synthesis_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    if fell_back {
        counter!(
            format!("{}_synthesis_fallbacks_total", METRICS_PREFIX),
            "mode" => mode.to_string()
        )
        .increment(1);
    }
}

/// Helper to record LLM request metrics
pub fn record_llm_request(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}
