// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTH_PATH: &str = "/health";

/// Serves the registry until `cancel` fires
pub async fn run_metrics_server(
    socket_address: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(socket_address).await?;
    info!("Metrics server listening on {}", socket_address);
    axum::serve(listener, make_router(registry).into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

pub(crate) fn make_router(registry: Registry) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route(HEALTH_PATH, get(health_check))
        .route(METRICS_PATH, get(metrics))
        .with_state(registry)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {:?}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            format!("Failed to encode metrics: {}", e).into_bytes(),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BridgeMetrics;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_registry() {
        let registry = Registry::new();
        let metrics = BridgeMetrics::new(&registry);
        metrics
            .last_synced_block
            .with_label_values(&["ETH-MAIN-A", "init"])
            .set(42);

        let response = metrics_handler_response(registry).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(
            "teleport_last_synced_block{domain=\"ETH-MAIN-A\",synchronizer=\"init\"} 42"
        ));
    }

    async fn metrics_handler_response(registry: Registry) -> axum::response::Response {
        metrics(State(registry)).await.into_response()
    }

    #[tokio::test]
    async fn test_server_shuts_down_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_metrics_server(
            "127.0.0.1:0".parse().unwrap(),
            Registry::new(),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
