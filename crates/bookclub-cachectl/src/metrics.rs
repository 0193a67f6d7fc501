//! Prometheus export of the cache counters.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the global recorder and serve the exposition on `addr`.
///
/// Must be called from within the tokio runtime; the listener runs as a
/// background task until the process exits.
pub fn serve(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start Prometheus exporter on {addr}"))?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Install the global recorder without a listener, for rendering on demand.
pub fn capture() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
