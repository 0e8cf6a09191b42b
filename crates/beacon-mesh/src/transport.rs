//! The peer-mesh [`Transport`] implementation: listener + outbound dialer,
//! hello handshake, duplicate-connection resolution, and reconnect loop
//! (spec.md §4.6).

use std::{
    collections::{HashMap, HashSet},
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
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use crate::{
    config::MeshConfig,
    error::MeshError,
    protocol::{drain_lines, Envelope},
};

/// Per-configured-address dial bookkeeping: never dial while a dial is
/// already in flight or a ready connection is bound to the address
/// (spec.md §4.6).
#[derive(Debug, Clone)]
enum AddressState {
    Idle,
    Dialing,
    Ready(String),
}

struct Shared {
    config: MeshConfig,
    logger: Logger,
    hub: Mutex<Option<Arc<Hub>>>,
    ready_nodes: Mutex<HashSet<String>>,
    address_states: Mutex<HashMap<String, AddressState>>,
    stopped: AtomicBool,
}

/// Which side of the connection we are, for handshake ordering and
/// reconnect eligibility.
enum Role {
    /// We initiated the TCP connection; `address` is the configured peer
    /// address, used for reconnect bookkeeping.
    Dialer { address: String },
    /// A remote node connected to us. Never reconnected (spec.md §4.6:
    /// "never reconnect addresses that were not explicitly configured").
    Acceptor,
}

/// TCP peer-mesh transport.
pub struct MeshTransport {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshTransport {
    /// Build a transport with the given config and logger. Does not bind or
    /// dial anything until [`Transport::start`] runs.
    pub fn new(config: MeshConfig, logger: Logger) -> Self {
        let shared = Arc::new(Shared {
            config,
            logger,
            hub: Mutex::new(None),
            ready_nodes: Mutex::new(HashSet::new()),
            address_states: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        });
        Self { shared, handles: Mutex::new(Vec::new()) }
    }

    /// This node's id on the mesh.
    pub fn node_id(&self) -> &str {
        &self.shared.config.node_id
    }

    /// Forward `message` to every currently-ready peer (spec.md §4.6
    /// "Broadcast (optional helper)").
    pub fn broadcast(&self, message: Message) {
        let hub = self.shared.hub.lock().expect("hub slot poisoned").clone();
        let Some(hub) = hub else { return };
        let nodes: Vec<String> = self.shared.ready_nodes.lock().expect("ready set poisoned").iter().cloned().collect();
        for node_id in nodes {
            hub.send(&format!("mesh:{node_id}"), message.clone());
        }
    }
}

#[async_trait]
impl Transport for MeshTransport {
    fn name(&self) -> &str {
        "mesh"
    }

    async fn start(&self, hub: Arc<Hub>) -> Result<(), KernelError> {
        let listener =
            TcpListener::bind((self.shared.config.host.as_str(), self.shared.config.port)).await.map_err(|err| {
                KernelError::TransportStartFailed { name: "mesh".to_string(), reason: err.to_string() }
            })?;

        *self.shared.hub.lock().expect("hub slot poisoned") = Some(Arc::clone(&hub));
        self.shared.stopped.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let accept_hub = Arc::clone(&hub);
        let accept_handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let shared = Arc::clone(&shared);
                        let hub = Arc::clone(&accept_hub);
                        tokio::spawn(async move {
                            if let Err(err) = run_connection(stream, Role::Acceptor, shared, hub).await {
                                tracing::debug!("mesh connection from {addr} ended: {err}");
                            }
                        });
                    },
                    Err(err) => tracing::error!("mesh accept failed: {err}"),
                }
            }
        });

        let mut handles = self.handles.lock().expect("handles poisoned");
        handles.push(accept_handle);

        for address in &self.shared.config.peers {
            let shared = Arc::clone(&self.shared);
            let hub = Arc::clone(&hub);
            let address = address.clone();
            handles.push(tokio::spawn(dial_loop(address, shared, hub)));
        }

        Ok(())
    }

    async fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        for handle in self.handles.lock().expect("handles poisoned").drain(..) {
            handle.abort();
        }
        if let Some(hub) = self.shared.hub.lock().expect("hub slot poisoned").take() {
            hub.close_transport_clients("mesh", "transport stopped");
        }
        self.shared.ready_nodes.lock().expect("ready set poisoned").clear();
        self.shared.address_states.lock().expect("address states poisoned").clear();
    }
}

async fn dial_loop(address: String, shared: Arc<Shared>, hub: Arc<Hub>) {
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }

        let should_dial = {
            let mut states = shared.address_states.lock().expect("address states poisoned");
            match states.get(&address) {
                Some(AddressState::Dialing) | Some(AddressState::Ready(_)) => false,
                _ => {
                    states.insert(address.clone(), AddressState::Dialing);
                    true
                },
            }
        };

        if should_dial {
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    let role = Role::Dialer { address: address.clone() };
                    if let Err(err) = run_connection(stream, role, Arc::clone(&shared), Arc::clone(&hub)).await {
                        shared.logger.scoped(&address).debug(format!("mesh connection ended: {err}"));
                    }
                },
                Err(err) => {
                    shared.logger.scoped(&address).debug(format!("dial failed: {err}"));
                    shared.address_states.lock().expect("address states poisoned").insert(address.clone(), AddressState::Idle);
                },
            }
        }

        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(shared.config.reconnect_interval_ms)).await;
    }
}

async fn run_connection(mut stream: TcpStream, role: Role, shared: Arc<Shared>, hub: Arc<Hub>) -> Result<(), MeshError> {
    let my_node_id = shared.config.node_id.clone();

    if let Role::Dialer { .. } = role {
        let line = Envelope::Hello { node_id: my_node_id.clone() }.to_line().expect("hello envelope always encodes");
        stream.write_all(line.as_bytes()).await?;
    }

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    // Block on the handshake: read until the remote's hello arrives.
    let remote_node_id = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(MeshError::HandshakeClosed);
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut found = None;
        for line in drain_lines(&mut buf) {
            match Envelope::from_line(&line) {
                Ok(Envelope::Hello { node_id }) => found = Some(node_id),
                Ok(Envelope::Message { .. }) => {}, // ignore, shouldn't arrive pre-handshake
                Err(err) => shared.logger.error(format!("malformed mesh line during handshake: {}", MeshError::from(err))),
            }
        }
        if let Some(node_id) = found {
            break node_id;
        }
    };

    if let Role::Acceptor = role {
        let line = Envelope::Hello { node_id: my_node_id.clone() }.to_line().expect("hello envelope always encodes");
        stream.write_all(line.as_bytes()).await?;
    }

    // Deduplication: at most one active connection per remote node id
    // (spec.md §4.6, §8).
    let already_ready = {
        let mut ready = shared.ready_nodes.lock().expect("ready set poisoned");
        if ready.contains(&remote_node_id) {
            true
        } else {
            ready.insert(remote_node_id.clone());
            false
        }
    };

    if already_ready {
        if let Role::Dialer { address } = &role {
            shared.address_states.lock().expect("address states poisoned").insert(address.clone(), AddressState::Idle);
        }
        return Ok(()); // close and discard this duplicate connection immediately
    }

    if let Role::Dialer { address } = &role {
        shared
            .address_states
            .lock()
            .expect("address states poisoned")
            .insert(address.clone(), AddressState::Ready(remote_node_id.clone()));
    }

    let client_id = format!("mesh:{remote_node_id}");
    let (sink, mut outbound_rx, mut close_rx) = ChannelSink::new();
    let mut metadata = HashMap::new();
    metadata.insert("nodeId".to_string(), Value::String(remote_node_id.clone()));
    hub.register_client(client_id.clone(), "mesh", Arc::new(sink) as Arc<dyn ClientSink>, metadata);

    let reason = loop {
        tokio::select! {
            result = stream.read(&mut chunk) => {
                match result {
                    Ok(0) => break Some("peer closed".to_string()),
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        for line in drain_lines(&mut buf) {
                            match Envelope::from_line(&line) {
                                Ok(Envelope::Message { message }) => hub.receive(message, &client_id),
                                Ok(Envelope::Hello { .. }) => {}, // post-handshake hello is a no-op
                                Err(err) => shared.logger.scoped(&client_id).error(format!("dropped malformed mesh line: {err}")),
                            }
                        }
                    }
                    Err(err) => break Some(err.to_string()),
                }
            }
            Some(message) = outbound_rx.recv() => {
                let envelope = Envelope::Message { message };
                match envelope.to_line() {
                    Ok(line) => {
                        if stream.write_all(line.as_bytes()).await.is_err() {
                            break Some("write failed".to_string());
                        }
                    }
                    Err(err) => shared.logger.scoped(&client_id).error(format!("failed to encode outbound mesh message: {err}")),
                }
            }
            Some(close_reason) = close_rx.recv() => {
                break Some(close_reason.unwrap_or_else(|| "closed by application".to_string()));
            }
        }
    };

    shared.ready_nodes.lock().expect("ready set poisoned").remove(&remote_node_id);
    if let Role::Dialer { address } = &role {
        shared.address_states.lock().expect("address states poisoned").insert(address.clone(), AddressState::Idle);
    }
    hub.unregister_client(&client_id, reason);
    Ok(())
}
