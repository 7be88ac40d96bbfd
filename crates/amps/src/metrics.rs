use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Serves Prometheus metrics and a health check over HTTP.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or the HTTP
/// listener cannot bind.
pub async fn start_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Connection count gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("amp_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("amp_connections_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Increment the admissible-packets counter.
    pub fn packets_total() {
        metrics::counter!("amp_packets_total").increment(1);
    }

    /// Increment the dropped-packets counter with the given reason label.
    pub fn packets_dropped_total(reason: &'static str) {
        metrics::counter!("amp_packets_dropped_total", "reason" => reason).increment(1);
    }

    /// Record a forward attempt with the given outcome label.
    pub fn forwards_total(status: &'static str) {
        metrics::counter!("amp_forwards_total", "status" => status).increment(1);
    }

    /// Record a discovery query with the given kind label.
    pub fn discovery_total(kind: &'static str) {
        metrics::counter!("amp_discovery_total", "kind" => kind).increment(1);
    }

    /// Increment the heartbeat-evictions counter.
    pub fn heartbeat_evictions_total() {
        metrics::counter!("amp_heartbeat_evictions_total").increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record a packet dispatch latency observation in seconds.
    pub fn dispatch_latency_seconds(value: f64) {
        metrics::histogram!("amp_dispatch_latency_seconds").record(value);
    }
}
