//! Configuration surface for the peer-mesh transport (spec.md §4.6).

use uuid::Uuid;

/// Options accepted by [`crate::transport::MeshTransport`].
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// This node's identity on the mesh. Defaults to a fresh UUID.
    pub node_id: String,
    /// Host/interface to bind the mesh listener on.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// `host:port` addresses of sibling nodes to dial and keep reconnecting.
    pub peers: Vec<String>,
    /// Delay before re-dialing a configured peer whose connection dropped.
    pub reconnect_interval_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            host: "0.0.0.0".to_string(),
            port: 9090,
            peers: Vec::new(),
            reconnect_interval_ms: 5_000,
        }
    }
}
