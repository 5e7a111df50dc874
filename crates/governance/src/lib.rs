#![deny(unused)]
//! Observability for Vibebolt.
//!
//! This crate provides:
//! - Tracing subscriber setup (human or JSON output, `EnvFilter`)
//! - Prometheus metrics recorder
//! - Sandbox pipeline and tool-call metrics helpers

pub mod metrics;
pub mod tracing_layer;

pub use metrics::{setup_metrics_recorder, track_extraction, track_request, track_stage};
pub use tracing_layer::configure_tracing;
