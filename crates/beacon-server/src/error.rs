//! Error type for the reference server binary.

use beacon_core::error::KernelError;
use thiserror::Error;

/// Errors that can surface from [`crate::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// A config file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A transport failed to start (spec.md §4.8: "Transport start failure:
    /// surfaced out of `start()`; caller's responsibility").
    #[error(transparent)]
    Kernel(#[from] KernelError),
}
