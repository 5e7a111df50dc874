//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use vibebolt_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track one tool call at the gateway (latency, count).
pub fn track_request(tool: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "tool_calls_total",
        "tool" => tool.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!("tool_call_duration_seconds", "tool" => tool.to_string())
        .record(latency_sec);
}

/// Track one sandbox stage container (`build` or `run`).
pub fn track_stage(stage: &'static str, exit_code: i64, seconds: f64) {
    let outcome = if exit_code == 0 { "success" } else { "failure" };
    metrics::counter!("sandbox_stage_total", "stage" => stage, "outcome" => outcome).increment(1);
    metrics::histogram!("sandbox_stage_duration_seconds", "stage" => stage).record(seconds);
}

/// Track one artifact extraction attempt.
pub fn track_extraction(kind: &'static str, found: bool) {
    let outcome = if found { "found" } else { "missing" };
    metrics::counter!("sandbox_extraction_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}
