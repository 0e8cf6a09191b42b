//! WebRTC signaling bridge (spec.md §4.7): a [`beacon_core::kernel::Kernel`]
//! attachment with no transport of its own. Validates and routes four
//! signal channels — offer, answer, candidate, bye — derived from a
//! configurable namespace.

pub mod bridge;
pub mod config;
pub mod error;

pub use bridge::{SignalReason, SignalingBridge};
pub use config::SignalingConfig;
pub use error::SignalError;
