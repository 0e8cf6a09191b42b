//! beacon-server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults: WebSocket on :7070, mesh on :9090, no peers
//! beacon-server
//!
//! # Join a mesh of three nodes via a config file
//! beacon-server --config beacon.toml
//! ```

use beacon_server::{error::ServerError, start, Args};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("beacon-server starting");
    tracing::info!("binding websocket on {}:{}, mesh on {}:{}", args.ws_host, args.ws_port, args.mesh_host, args.mesh_port);

    let kernel = start(&args).await?;
    tracing::info!("beacon-server started");

    let _summary = beacon_server::spawn_summary_logger(kernel.clone(), std::time::Duration::from_secs(30));

    tokio::signal::ctrl_c().await.map_err(|err| ServerError::Config(err.to_string()))?;
    tracing::info!("shutting down");
    kernel.stop().await;

    Ok(())
}
