//! Dispatch kernel, connection hub, and shared client/room/presence state
//! for the beacon messaging core. Transports (`beacon-ws`, `beacon-mesh`)
//! and application glue (`beacon-signaling`, `beacon-server`) build on the
//! types exported here; none of them are referenced from this crate.

pub mod client;
pub mod clock;
pub mod error;
pub mod hub;
pub mod kernel;
pub mod logger;
pub mod message;
pub mod presence;
pub mod room_manager;

pub use client::{ChannelSink, ClientSink, Transport};
pub use clock::{Clock, SystemClock};
pub use error::{HubError, KernelError, SinkError};
pub use hub::{Hub, HubEvent};
pub use kernel::{
    EventKind, HandlerError, Kernel, PresenceToolkit, ReplyOverrides, RoomBroadcastOptions, RoomToolkit, Toolkit,
};
pub use logger::{LogLevel, Logger};
pub use message::{Message, Target};
pub use presence::{PresenceSnapshot, PresenceStore};
pub use room_manager::RoomManager;
