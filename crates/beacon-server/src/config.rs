//! CLI arguments and the optional TOML config file (SPEC_FULL.md §3
//! "Configuration").
//!
//! The CLI covers per-process deployment knobs (ports, log level);
//! `beacon.toml` covers the bits that don't fit comfortably on a command
//! line — the mesh peer list and the WebSocket path filter — matching how
//! every comparable mesh tool in the retrieval pack declares its peer list
//! in a file rather than as repeated flags.

use clap::Parser;
use serde::Deserialize;

use crate::error::ServerError;

/// `beacon-server` command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "beacon-server")]
#[command(about = "Embeddable real-time messaging kernel: WebSocket + mesh + signaling, wired into one process")]
#[command(version)]
pub struct Args {
    /// Host/interface the WebSocket transport binds to.
    #[arg(long, default_value = "0.0.0.0")]
    pub ws_host: String,

    /// Port the WebSocket transport listens on.
    #[arg(long, default_value_t = 7070)]
    pub ws_port: u16,

    /// WebSocket heartbeat interval, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub heartbeat_interval_ms: u64,

    /// Host/interface the peer-mesh transport binds to.
    #[arg(long, default_value = "0.0.0.0")]
    pub mesh_host: String,

    /// Port the peer-mesh transport listens on.
    #[arg(long, default_value_t = 9090)]
    pub mesh_port: u16,

    /// Delay before re-dialing a configured peer whose connection dropped.
    #[arg(long, default_value_t = 5_000)]
    pub reconnect_interval_ms: u64,

    /// Namespace prefix for the WebRTC signaling channels.
    #[arg(long, default_value = "webrtc")]
    pub signaling_namespace: String,

    /// Path to an optional `beacon.toml` config file (peers, path filter).
    #[arg(long)]
    pub config: Option<String>,

    /// Log level: silent, error, info, or debug.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// The bits of configuration that don't fit on a command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeaconConfig {
    /// This node's identity on the mesh. A fresh UUID is used if absent.
    pub node_id: Option<String>,
    /// `host:port` addresses of sibling nodes to dial and reconnect.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Optional path prefix filter for the WebSocket upgrade handshake.
    pub path: Option<String>,
    /// Whether a `webrtc:offer` carrying a room auto-joins the originator.
    #[serde(default)]
    pub auto_join_rooms: bool,
}

impl BeaconConfig {
    /// Load and parse a `beacon.toml`-shaped file.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ServerError::Config(format!("reading {path}: {err}")))?;
        toml::from_str(&raw).map_err(|err| ServerError::Config(format!("parsing {path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let config: BeaconConfig = toml::from_str(
            r#"
            node_id = "node-1"
            peers = ["127.0.0.1:9091", "127.0.0.1:9092"]
            path = "/chat"
            auto_join_rooms = true
            "#,
        )
        .unwrap();
        assert_eq!(config.node_id.as_deref(), Some("node-1"));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.path.as_deref(), Some("/chat"));
        assert!(config.auto_join_rooms);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: BeaconConfig = toml::from_str("").unwrap();
        assert!(config.node_id.is_none());
        assert!(config.peers.is_empty());
        assert!(!config.auto_join_rooms);
    }
}
