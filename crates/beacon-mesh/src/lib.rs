//! TCP peer-mesh transport (spec.md §4.6) plugged into a
//! [`beacon_core::hub::Hub`] via the [`beacon_core::client::Transport`]
//! trait. Dials and accepts connections between sibling backend nodes,
//! exchanges a `hello` handshake, deduplicates by node id, and surfaces each
//! ready peer as one synthetic client `mesh:<nodeId>`.

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::MeshConfig;
pub use error::MeshError;
pub use protocol::Envelope;
pub use transport::MeshTransport;
