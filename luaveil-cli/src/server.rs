//! Liveness and telemetry endpoints.

use std::sync::Arc;

use anyhow::Result;
use luaveil_core::Metrics;
use tracing::info;
use warp::Filter;

/// Serves `GET /health` and `GET /metrics` until ctrl-c.
pub async fn serve(port: u16, metrics: Arc<Metrics>) -> Result<()> {
    let health = warp::get()
        .and(warp::path("health"))
        .map(|| "Healthy");

    let metrics_route = warp::get()
        .and(warp::path("metrics"))
        .map(move || metrics.export());

    let routes = health.or(metrics_route);

    let (addr, server) =
        warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down health server");
        });
    info!("health server listening on {addr}");
    server.await;
    Ok(())
}
