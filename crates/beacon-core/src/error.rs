//! Error types for the dispatch kernel and connection hub.

use thiserror::Error;

/// Errors raised by [`crate::hub::Hub`] operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The referenced client is not currently registered.
    #[error("client not found: {0}")]
    ClientNotFound(String),
}

/// Errors raised while registering or invoking [`crate::kernel::Kernel`]
/// handlers.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A handler template's placeholder count did not match the number of
    /// substitution parameters supplied at registration time.
    #[error("handler template {template:?} expects {expected} parameter(s), got {got}")]
    ParamCountMismatch {
        /// The raw template string, e.g. `"chat:join:[roomId]"`.
        template: String,
        /// Number of `[placeholder]` tokens found in the template.
        expected: usize,
        /// Number of parameters supplied by the caller.
        got: usize,
    },

    /// A transport failed to start.
    #[error("transport {name:?} failed to start: {reason}")]
    TransportStartFailed {
        /// Name of the transport that failed.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },
}

/// Errors surfaced by a [`crate::client::ClientSink`] implementation when a
/// write could not be delivered.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying transport connection is already closed.
    #[error("connection closed")]
    Closed,
    /// The message could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
