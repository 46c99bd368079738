//! # Relay Metrics
//!
//! Passive telemetry recorder. Implements the observer traits of the
//! resilience, embedder, and stream crates, counting transitions,
//! call outcomes, latencies, and session lifecycles into a prometheus
//! registry. Nothing in the hot path ever blocks on it.
//!
//! An optional hyper exporter serves the registry as `/metrics`.

mod exporter;
mod recorder;

pub use exporter::serve_metrics;
pub use recorder::MetricsRecorder;
