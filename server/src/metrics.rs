//! Prometheus metrics exposition.
//!
//! Installs the global `metrics` recorder and serves the rendered
//! exposition at `GET /metrics` on the API port. The engine and the
//! storage adapter record through the `metrics` facade macros, so the
//! recorder picks everything up without further wiring.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the Prometheus exporter.
    #[error("failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the global recorder.
    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// Call once at startup.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    describe_counter!(
        "noncepool_lineages_created_total",
        "Total number of lineages created"
    );
    describe_counter!(
        "noncepool_optimistic_lock_conflicts_total",
        "Optimistic-lock conflicts absorbed by the retry loop, by operation"
    );
    describe_histogram!(
        "noncepool_lease_duration_seconds",
        "End-to-end duration of lease operations, including retries"
    );
    describe_histogram!(
        "noncepool_release_duration_seconds",
        "End-to-end duration of release operations, including retries"
    );
    describe_histogram!(
        "noncepool_close_duration_seconds",
        "End-to-end duration of close operations, including retries"
    );

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    builder
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))
}

/// Router serving the Prometheus exposition.
#[must_use]
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}
