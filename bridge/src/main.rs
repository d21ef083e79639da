// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};
use teleport_bridge::config::BridgeNodeConfig;
use teleport_bridge::node::run_bridge_node;
use teleport_bridge::server::run_metrics_server;
use teleport_config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[clap(long, env = "TELEPORT_BRIDGE_CONFIG")]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeNodeConfig::load(&args.config_path)?;
    let cancel = CancellationToken::new();

    let prometheus_registry = prometheus::Registry::new();
    let metrics_address =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), config.metrics_port);
    let metrics_server = tokio::spawn(run_metrics_server(
        metrics_address,
        prometheus_registry.clone(),
        cancel.clone(),
    ));
    info!("Metrics server started at port {}", config.metrics_port);

    let handle = run_bridge_node(config, prometheus_registry, cancel.clone()).await?;

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {:?}", e);
                return;
            }
            info!("Shutdown requested");
            cancel.cancel();
        }
    });

    handle
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?;
    cancel.cancel();
    metrics_server
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
}
