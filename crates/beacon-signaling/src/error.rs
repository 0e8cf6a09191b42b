//! Error type for the signaling bridge's payload decoding boundary
//! (SPEC_FULL.md §3 "Error handling"), layered the same way
//! `beacon-core/src/error.rs` wraps lower-level causes with `#[from]`.

use thiserror::Error;

/// Errors raised while decoding an inbound signal payload. Never surfaced
/// past [`crate::bridge::SignalingBridge`] — the handler logs it and
/// replies with a `<ns>:error` the same way an [`crate::bridge::SignalReason`]
/// validation failure does.
#[derive(Debug, Error)]
pub enum SignalError {
    /// `message.payload` did not decode into the expected shape.
    #[error("malformed signal payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}
