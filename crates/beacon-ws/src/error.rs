//! Error type for the WebSocket transport's connection I/O boundary
//! (SPEC_FULL.md §3 "Error handling"), layered the same way
//! `beacon-core/src/error.rs` wraps lower-level causes with `#[from]`.

use thiserror::Error;

/// Errors raised while performing the upgrade handshake or servicing a
/// connected socket. Never surfaced past
/// [`crate::transport::WsTransport`] — per spec.md §4.8 "Handshake failure
/// ... destroy the socket without response body" and "Socket errors cause
/// exactly one disconnect event per client" — callers only log it and move
/// on to the next connection.
#[derive(Debug, Error)]
pub enum WsError {
    /// A read or write on the connection's socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The upgrade request was rejected (missing/invalid `Upgrade` header,
    /// missing key, or a path filter mismatch).
    #[error(transparent)]
    Handshake(#[from] crate::handshake::HandshakeError),
}
