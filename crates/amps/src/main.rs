#![forbid(unsafe_code)]

use amps::config::{Args, ServerConfig};
use amps::metrics::start_metrics_server;
use amps::server::ServerState;
use amps::{heartbeat, run, SERVER_VERSION};
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config: ServerConfig = args.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, version = SERVER_VERSION, "amps starting");

    let metrics_addr = config.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_addr).await {
            warn!(error = %e, "metrics server error");
        }
    });

    let state = Arc::new(ServerState::new(config));
    heartbeat::spawn(Arc::clone(&state));

    tokio::select! {
        result = run(listener, state) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
