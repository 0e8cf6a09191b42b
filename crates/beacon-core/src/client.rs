//! Client-facing capabilities: the `send`/`close` pair every registered
//! client exposes (spec.md §3 "ClientContext / TransportClient"), and the
//! `Transport` seam a runtime (WebSocket, mesh, ...) implements to plug into
//! a [`crate::hub::Hub`].

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;

use crate::{error::SinkError, hub::Hub, message::Message};

/// The write/close half of a connected client, implemented by whichever
/// transport accepted it. The Hub never inspects the concrete type — it only
/// ever calls through this trait, keeping the Hub/transport ownership
/// acyclic (design note, spec.md §9): transports hold a `Arc<Hub>`, never
/// the reverse.
pub trait ClientSink: Send + Sync + fmt::Debug {
    /// Enqueue `message` for delivery to this client. Implementations must
    /// not block — a transport typically hands this to a per-socket writer
    /// task via a channel, serializing writes per socket (spec.md §5).
    fn send(&self, message: Message) -> Result<(), SinkError>;

    /// Request that the underlying connection be closed. `reason` is for
    /// diagnostics only; the wire protocol may not carry it anywhere.
    fn close(&self, reason: Option<String>);
}

/// A [`ClientSink`] backed by an unbounded channel to a per-connection
/// writer task. Both bundled transports (`beacon-ws`, `beacon-mesh`) use
/// this shape: one task reads the receiving half and serializes writes onto
/// a single socket.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    outbound: mpsc::UnboundedSender<Message>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    close_tx: mpsc::UnboundedSender<Option<String>>,
}

impl ChannelSink {
    /// Build a sink plus the two receiving halves a writer/closer task
    /// should drive: outbound messages, and close requests.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>, mpsc::UnboundedReceiver<Option<String>>)
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let sink = Self {
            outbound,
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            close_tx,
        };
        (sink, outbound_rx, close_rx)
    }
}

impl ClientSink for ChannelSink {
    fn send(&self, message: Message) -> Result<(), SinkError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.outbound.send(message).map_err(|_| SinkError::Closed)
    }

    fn close(&self, reason: Option<String>) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        let _ = self.close_tx.send(reason);
    }
}

/// A transport plugged into a Kernel. Transports own their listening socket
/// (or dialer loop) and register/unregister [`ClientSink`]s with the Hub as
/// connections come and go; they never reach into the Kernel (spec.md §9).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name, used in logs and in `ServerError` if startup
    /// fails.
    fn name(&self) -> &str;

    /// Begin accepting/dialing connections against `hub`. Must return once
    /// listening/dialing has started; ongoing work continues on spawned
    /// tasks. A failure here is fatal and propagates out of
    /// `Kernel::start()` (spec.md §4.8).
    async fn start(&self, hub: Arc<Hub>) -> Result<(), crate::error::KernelError>;

    /// Close every connection this transport owns and stop accepting new
    /// ones. Returns once all owned connections have been unregistered from
    /// the Hub.
    async fn stop(&self);
}
