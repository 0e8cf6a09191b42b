//! The WebSocket [`Transport`] implementation: accept loop, per-connection
//! handshake, frame I/O, and heartbeat (spec.md §4.5).

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use beacon_core::{
    client::{ChannelSink, ClientSink, Transport},
    error::KernelError,
    hub::Hub,
    logger::Logger,
    message::Message,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    config::WsConfig,
    error::WsError,
    frame::{decode_frame, encode_close, encode_ping, encode_pong, encode_text, Decoded, Opcode},
    handshake::{build_accept_response, check_path, compute_accept, parse_upgrade_request},
};

/// Hand-rolled RFC 6455 WebSocket server transport.
pub struct WsTransport {
    config: WsConfig,
    logger: Logger,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    hub: Mutex<Option<Arc<Hub>>>,
}

impl WsTransport {
    /// Build a transport with the given config and logger. Does not bind
    /// any socket until [`Transport::start`] runs.
    pub fn new(config: WsConfig, logger: Logger) -> Self {
        Self { config, logger, accept_handle: Mutex::new(None), hub: Mutex::new(None) }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn start(&self, hub: Arc<Hub>) -> Result<(), KernelError> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await.map_err(|err| {
            KernelError::TransportStartFailed { name: "websocket".to_string(), reason: err.to_string() }
        })?;

        *self.hub.lock().expect("hub slot poisoned") = Some(Arc::clone(&hub));

        let config = self.config.clone();
        let logger = self.logger.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let hub = Arc::clone(&hub);
                        let config = config.clone();
                        let logger = logger.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, hub, config, logger.clone()).await {
                                logger.debug(format!("connection from {addr} ended: {err}"));
                            }
                        });
                    },
                    Err(err) => logger.error(format!("accept failed: {err}")),
                }
            }
        });

        *self.accept_handle.lock().expect("accept handle poisoned") = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.accept_handle.lock().expect("accept handle poisoned").take() {
            handle.abort();
        }
        if let Some(hub) = self.hub.lock().expect("hub slot poisoned").take() {
            hub.close_transport_clients("websocket", "transport stopped");
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

const MAX_HANDSHAKE_BYTES: usize = 16_384;

async fn read_handshake(stream: &mut TcpStream) -> Result<String, WsError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "socket closed during handshake").into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            return Ok(String::from_utf8_lossy(&buf[..pos]).into_owned());
        }
        if buf.len() > MAX_HANDSHAKE_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "handshake exceeded size limit").into());
        }
    }
}

/// Decode and act on every complete frame currently buffered. Returns
/// `Some(reason)` if the connection should close.
async fn process_inbound(
    buf: &mut Vec<u8>,
    stream: &mut TcpStream,
    hub: &Hub,
    client_id: &str,
    alive: &AtomicBool,
    logger: &Logger,
) -> io::Result<Option<String>> {
    loop {
        let (frame, consumed) = match decode_frame(buf) {
            Decoded::Frame { frame, consumed } => (frame, consumed),
            Decoded::Incomplete => return Ok(None),
        };
        buf.drain(0..consumed);

        match frame.opcode {
            Opcode::Text => {
                alive.store(true, Ordering::Release);
                match Message::parse(&frame.payload) {
                    Some(message) => hub.receive(message, client_id),
                    None => logger.scoped(client_id).error("dropped malformed inbound message"),
                }
            },
            Opcode::Close => return Ok(Some("close frame received".to_string())),
            Opcode::Ping => {
                stream.write_all(&encode_pong(&frame.payload)).await?;
            },
            Opcode::Pong => alive.store(true, Ordering::Release),
            Opcode::Other(_) => {},
        }
    }
}

async fn handle_connection(mut stream: TcpStream, hub: Arc<Hub>, config: WsConfig, logger: Logger) -> Result<(), WsError> {
    let raw = read_handshake(&mut stream).await?;

    // Handshake rejection destroys the socket without a response body
    // (spec.md §4.8); the `?` just routes the reason to the accept loop's
    // debug log instead of discarding it.
    let request = parse_upgrade_request(&raw)?;
    check_path(&request, config.path.as_deref())?;

    let accept = compute_accept(&request.key);
    stream.write_all(build_accept_response(&accept).as_bytes()).await?;

    let client_id = Uuid::new_v4().to_string();
    let (sink, mut outbound_rx, mut close_rx) = ChannelSink::new();
    hub.register_client(client_id.clone(), "websocket", Arc::new(sink) as Arc<dyn ClientSink>, HashMap::new());

    let alive = AtomicBool::new(true);
    let mut read_buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut heartbeat = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));
    heartbeat.tick().await; // first tick fires immediately

    let reason = loop {
        tokio::select! {
            result = stream.read(&mut chunk) => {
                match result {
                    Ok(0) => break Some("peer closed".to_string()),
                    Ok(n) => {
                        read_buf.extend_from_slice(&chunk[..n]);
                        match process_inbound(&mut read_buf, &mut stream, &hub, &client_id, &alive, &logger).await {
                            Ok(Some(reason)) => break Some(reason),
                            Ok(None) => {},
                            Err(_) => break Some("read error".to_string()),
                        }
                    },
                    Err(err) => break Some(err.to_string()),
                }
            }
            Some(message) = outbound_rx.recv() => {
                let bytes = message.to_json_bytes().unwrap_or_default();
                if stream.write_all(&encode_text(&bytes)).await.is_err() {
                    break Some("write failed".to_string());
                }
            }
            Some(close_reason) = close_rx.recv() => {
                let _ = stream.write_all(&encode_close()).await;
                break Some(close_reason.unwrap_or_else(|| "closed by application".to_string()));
            }
            _ = heartbeat.tick() => {
                if alive.swap(false, Ordering::AcqRel) {
                    if stream.write_all(&encode_ping()).await.is_err() {
                        break Some("heartbeat write failed".to_string());
                    }
                } else {
                    break Some("heartbeat timeout".to_string());
                }
            }
        }
    };

    hub.unregister_client(&client_id, reason);
    Ok(())
}
