//! Reference binary: wires the dispatch kernel, the WebSocket transport,
//! the peer-mesh transport, and the WebRTC signaling bridge together. Owns
//! CLI parsing and the `tracing` subscriber; no messaging logic of its own
//! lives here (SPEC_FULL.md §2 "beacon-server").

pub mod config;
pub mod error;

use std::{sync::Arc, time::Duration};

use beacon_core::{logger::LogLevel, Kernel, Logger};
use beacon_mesh::{MeshConfig, MeshTransport};
use beacon_signaling::{SignalingBridge, SignalingConfig};
use beacon_ws::{WsConfig, WsTransport};

pub use config::{Args, BeaconConfig};
pub use error::ServerError;

/// Build and start a kernel from CLI args plus an optional config file,
/// returning it already running. Callers are responsible for eventually
/// calling [`Kernel::stop`].
pub async fn start(args: &Args) -> Result<Arc<Kernel>, ServerError> {
    let file_config = match &args.config {
        Some(path) => BeaconConfig::load(path)?,
        None => BeaconConfig::default(),
    };

    let log_level: LogLevel = args.log_level.parse().unwrap_or_default();
    let kernel = Arc::new(Kernel::new(log_level));

    let signaling = SignalingBridge::new(SignalingConfig {
        namespace: args.signaling_namespace.clone(),
        auto_join_rooms: file_config.auto_join_rooms,
    });
    signaling.attach(&kernel);

    let ws_config = WsConfig {
        port: args.ws_port,
        host: args.ws_host.clone(),
        path: file_config.path.clone(),
        heartbeat_interval_ms: args.heartbeat_interval_ms,
    };
    kernel.use_transport(Arc::new(WsTransport::new(ws_config, Logger::new(log_level)))).await?;

    let mesh_config = MeshConfig {
        node_id: file_config.node_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        host: args.mesh_host.clone(),
        port: args.mesh_port,
        peers: file_config.peers.clone(),
        reconnect_interval_ms: args.reconnect_interval_ms,
    };
    kernel.use_transport(Arc::new(MeshTransport::new(mesh_config, Logger::new(log_level)))).await?;

    kernel.start().await?;
    Ok(kernel)
}

/// Spawn the periodic connection/room-count summary logger (SPEC_FULL.md
/// §4 "Room listing and presence listing are exposed read-only ... logs a
/// periodic summary at `info` level").
pub fn spawn_summary_logger(kernel: Arc<Kernel>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            tracing::info!("beacon summary: clients={} rooms={}", kernel.presence().len(), kernel.room_count());
        }
    })
}
