//! Error type for the peer-mesh transport's connection I/O boundary
//! (SPEC_FULL.md §3 "Error handling"), layered the same way
//! `beacon-core/src/error.rs` wraps lower-level causes with `#[from]`.

use thiserror::Error;

/// Errors raised while dialing, handshaking, or running a mesh connection.
/// Never surfaced past [`crate::transport::MeshTransport`] — per spec.md
/// §4.8 "Peer dial/connection loss: internal only; triggers scheduled
/// reconnect; never surfaced upward" — callers only log it and move on.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The peer closed the socket before completing the hello handshake.
    #[error("peer closed before completing the hello handshake")]
    HandshakeClosed,

    /// A read or write on the connection's socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A buffered line could not be decoded as a hello/message envelope.
    #[error("malformed mesh envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}
