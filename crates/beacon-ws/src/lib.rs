//! Hand-rolled RFC 6455 WebSocket transport (spec.md §4.5) plugged into a
//! [`beacon_core::hub::Hub`] via the [`beacon_core::client::Transport`]
//! trait.

pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod transport;

pub use config::WsConfig;
pub use error::WsError;
pub use transport::WsTransport;
