//! Prometheus metrics helpers for the Chronicle relay engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chronicle_core::metrics::{try_init_metrics, start_metrics_server};
//!
//! if let Some(handle) = try_init_metrics() {
//!     start_metrics_server(9091, handle).await?;
//! }
//! metrics::counter!("policy_events_accepted_total").increment(1);
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`policy_`, `registry_`, `trust_`, `archive_`,
//!   `fetch_`, `backup_`, `scheduler_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only `result` on backup publishes, to keep cardinality flat

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

use crate::error::Result;

/// Try to install the Prometheus metrics recorder.
///
/// Returns `None` if a recorder is already installed. Metric descriptions are
/// registered when the recorder is installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_common_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server on `0.0.0.0:<port>`.
///
/// The listener is bound before returning so a port conflict is reported to
/// the caller; serving happens on a background task.
pub async fn start_metrics_server(port: u16, handle: PrometheusHandle) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the metrics emitted by the engine.
fn register_common_metrics() {
    // =========================================================================
    // Acceptance policy
    // =========================================================================

    describe_counter!(
        "policy_events_accepted_total",
        "Events accepted by the acceptance policy"
    );
    describe_counter!(
        "policy_events_rejected_total",
        "Events rejected by the acceptance policy"
    );
    describe_counter!(
        "policy_events_duplicate_total",
        "Accepted events that were already stored"
    );
    describe_gauge!("registry_roots", "Root threads tracked by the registry");

    // =========================================================================
    // Trust network
    // =========================================================================

    describe_gauge!("trust_network_size", "Authors in the current trust network");
    describe_counter!("trust_rebuilds_total", "Completed trust network rebuilds");
    describe_counter!(
        "trust_rebuild_failures_total",
        "Trust network rebuilds that kept the previous snapshot"
    );
    describe_histogram!(
        "trust_rebuild_duration_seconds",
        "Time spent rebuilding the trust network"
    );

    // =========================================================================
    // Archive, backfill and backup
    // =========================================================================

    describe_counter!(
        "archive_events_trusted_total",
        "Archived events accepted by the policy"
    );
    describe_counter!(
        "archive_events_untrusted_total",
        "Archived events rejected by the policy"
    );
    describe_counter!(
        "archive_events_duplicate_total",
        "Archived events that were already stored"
    );
    describe_counter!(
        "fetch_conversations_total",
        "Conversation backfills started"
    );
    describe_counter!(
        "fetch_events_stored_total",
        "Events stored by conversation backfills"
    );
    describe_counter!(
        "backup_publish_total",
        "Backup publishes per destination (label: result)"
    );
    describe_counter!(
        "profiles_stored_total",
        "Profile metadata events stored by refreshes"
    );
    describe_counter!("scheduler_cycles_total", "Completed refresh cycles");
    describe_gauge!("chronicle_running", "1 while the daemon is running");
}

/// Set a gauge value.
///
/// Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
