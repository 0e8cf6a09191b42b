//! Connection hub (spec.md §4.3).
//!
//! Owns the authoritative client registry plus the RoomManager and
//! PresenceStore it keeps in sync. Every Hub-mutating operation runs behind
//! a single coarse lock (spec.md §5: "serialize ... use a single dedicated
//! actor ... or a coarse lock around the Hub" — this takes the lock option,
//! since every operation here is non-blocking in-memory work). Events flow
//! out through an unbounded channel the Kernel owns the receiving half of;
//! the Hub never holds a reference back to the Kernel (spec.md §9).

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    clock::{Clock, SystemClock},
    client::ClientSink,
    error::HubError,
    logger::Logger,
    message::Message,
    presence::{PresenceSnapshot, PresenceStore},
    room_manager::RoomManager,
};

/// Events the Hub emits for the Kernel to dispatch against.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A client finished registering.
    Connected {
        /// The newly-registered client id.
        client_id: String,
    },
    /// A client was unregistered.
    Disconnected {
        /// The client id that disconnected.
        client_id: String,
        /// Caller-supplied reason, if any.
        reason: Option<String>,
    },
    /// A client sent a message.
    Message {
        /// The decoded message.
        message: Message,
        /// The client id that sent it.
        client_id: String,
    },
}

struct RegisteredClient {
    transport: String,
    sink: Arc<dyn ClientSink>,
}

struct HubInner {
    clients: HashMap<String, RegisteredClient>,
    rooms: RoomManager,
    presence: PresenceStore,
}

/// The connection hub.
pub struct Hub {
    inner: Mutex<HubInner>,
    events: mpsc::UnboundedSender<HubEvent>,
    clock: Arc<dyn Clock>,
    logger: Logger,
}

impl Hub {
    /// Build a Hub that emits events onto `events`, using the system clock
    /// for timestamps.
    pub fn new(events: mpsc::UnboundedSender<HubEvent>, logger: Logger) -> Self {
        Self::with_clock(events, logger, Arc::new(SystemClock))
    }

    /// Build a Hub with an explicit clock (for deterministic tests).
    pub fn with_clock(
        events: mpsc::UnboundedSender<HubEvent>,
        logger: Logger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                clients: HashMap::new(),
                rooms: RoomManager::new(),
                presence: PresenceStore::new(),
            }),
            events,
            clock,
            logger,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().expect("hub mutex poisoned")
    }

    /// Register a newly-accepted client. Takes an initial presence
    /// snapshot and emits `Connected`.
    pub fn register_client(
        &self,
        id: impl Into<String>,
        transport: impl Into<String>,
        sink: Arc<dyn ClientSink>,
        metadata: HashMap<String, Value>,
    ) {
        let id = id.into();
        let transport = transport.into();
        let now = self.clock.now_ms();

        {
            let mut inner = self.lock();
            inner.clients.insert(id.clone(), RegisteredClient { transport: transport.clone(), sink });
            inner.presence.connect(PresenceSnapshot {
                id: id.clone(),
                transport,
                metadata,
                connected_at_ms: now,
                rooms: Vec::new(),
            });
        }

        self.logger.scoped(&id).debug("client registered");
        let _ = self.events.send(HubEvent::Connected { client_id: id });
    }

    /// Unregister a client: leaves every room it belonged to (while its
    /// presence entry is still present), then deletes registry and
    /// presence entries, then emits `Disconnected`. No-op if unknown.
    pub fn unregister_client(&self, id: &str, reason: Option<String>) {
        let existed = {
            let mut inner = self.lock();
            if inner.clients.remove(id).is_none() {
                false
            } else {
                inner.rooms.leave_all(id);
                inner.presence.disconnect(id);
                true
            }
        };

        if !existed {
            return;
        }

        self.logger.scoped(id).debug(format!("client unregistered: {reason:?}"));
        let _ = self.events.send(HubEvent::Disconnected { client_id: id.to_string(), reason });
    }

    /// Feed an inbound message from `client_id` into the dispatch pipeline.
    /// Unknown clients are dropped silently (they may have just
    /// disconnected).
    pub fn receive(&self, message: Message, client_id: &str) {
        let known = self.lock().clients.contains_key(client_id);
        if !known {
            self.logger.scoped(client_id).debug("dropped message from unknown client");
            return;
        }
        let _ = self.events.send(HubEvent::Message { message, client_id: client_id.to_string() });
    }

    /// Join `client_id` to `room`, then refresh its rooms field and
    /// presence snapshot.
    pub fn join_room(&self, client_id: &str, room: &str) {
        let mut inner = self.lock();
        if !inner.clients.contains_key(client_id) {
            return;
        }
        inner.rooms.join(room, client_id);
        let rooms = inner.rooms.rooms_for(client_id);
        inner.presence.sync_rooms(client_id, rooms);
    }

    /// Leave `client_id` from `room`, then refresh its rooms field and
    /// presence snapshot.
    pub fn leave_room(&self, client_id: &str, room: &str) {
        let mut inner = self.lock();
        if !inner.clients.contains_key(client_id) {
            return;
        }
        inner.rooms.leave(room, client_id);
        let rooms = inner.rooms.rooms_for(client_id);
        inner.presence.sync_rooms(client_id, rooms);
    }

    /// Rooms a client currently belongs to.
    pub fn rooms_for(&self, client_id: &str) -> Vec<String> {
        self.lock().rooms.rooms_for(client_id)
    }

    /// Client ids currently in `room`.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        self.lock().rooms.list(room)
    }

    /// Stamp `message` with the current time and forward it to `id`'s sink.
    /// Returns whether delivery was *attempted* (i.e. the client was
    /// known), not whether the underlying write succeeded.
    pub fn send(&self, id: &str, mut message: Message) -> bool {
        message.timestamp = Some(self.clock.now_ms());

        let sink = {
            let inner = self.lock();
            inner.clients.get(id).map(|c| Arc::clone(&c.sink))
        };

        match sink {
            Some(sink) => {
                if let Err(err) = sink.send(message) {
                    self.logger.scoped(id).error(format!("send failed: {err}"));
                }
                true
            },
            None => false,
        }
    }

    /// Stamp `message` once, then dispatch to every target id: room members
    /// if `room` is given, else every registered client; `except` is always
    /// subtracted. Target enumeration order is unspecified.
    pub fn broadcast(&self, mut message: Message, room: Option<&str>, except: &HashSet<String>) {
        message.timestamp = Some(self.clock.now_ms());

        let targets: Vec<(String, Arc<dyn ClientSink>)> = {
            let inner = self.lock();
            let ids: Vec<String> = match room {
                Some(room) => inner.rooms.list(room),
                None => inner.clients.keys().cloned().collect(),
            };
            ids.into_iter()
                .filter(|id| !except.contains(id))
                .filter_map(|id| inner.clients.get(&id).map(|c| (id, Arc::clone(&c.sink))))
                .collect()
        };

        for (id, sink) in targets {
            if let Err(err) = sink.send(message.clone()) {
                self.logger.scoped(&id).error(format!("broadcast send failed: {err}"));
            }
        }
    }

    /// Read-only presence snapshot for a single client.
    pub fn presence_get(&self, id: &str) -> Option<PresenceSnapshot> {
        self.lock().presence.get(id)
    }

    /// Read-only presence snapshot for every connected client.
    pub fn presence_list(&self) -> Vec<PresenceSnapshot> {
        self.lock().presence.list()
    }

    /// Shallow-merge `metadata` into a client's presence entry.
    pub fn presence_update(&self, id: &str, metadata: HashMap<String, Value>) -> Result<(), HubError> {
        let mut inner = self.lock();
        if !inner.clients.contains_key(id) {
            return Err(HubError::ClientNotFound(id.to_string()));
        }
        inner.presence.update(id, metadata);
        Ok(())
    }

    /// Number of currently-registered clients.
    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.room_count()
    }

    /// `true` if `id` is currently registered.
    pub fn has_client(&self, id: &str) -> bool {
        self.lock().clients.contains_key(id)
    }

    /// Close and unregister every client belonging to `transport` (by tag).
    /// Used by a transport's `stop()` to tear down its own connections
    /// without touching clients owned by other transports.
    pub fn close_transport_clients(&self, transport: &str, reason: &str) {
        let ids: Vec<(String, Arc<dyn ClientSink>)> = {
            let inner = self.lock();
            inner
                .clients
                .iter()
                .filter(|(_, c)| c.transport == transport)
                .map(|(id, c)| (id.clone(), Arc::clone(&c.sink)))
                .collect()
        };

        for (id, sink) in ids {
            sink.close(Some(reason.to_string()));
            self.unregister_client(&id, Some(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::error::SinkError;

    #[derive(Debug)]
    struct RecordingSink {
        sent: StdMutex<Vec<Message>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: StdMutex::new(Vec::new()) })
        }
    }

    impl ClientSink for RecordingSink {
        fn send(&self, message: Message) -> Result<(), SinkError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        fn close(&self, _reason: Option<String>) {}
    }

    fn test_hub() -> (Hub, mpsc::UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Hub::new(tx, Logger::default()), rx)
    }

    #[test]
    fn register_then_unregister_emits_events() {
        let (hub, mut rx) = test_hub();
        let sink = RecordingSink::new();
        hub.register_client("c1", "websocket", sink, HashMap::new());

        assert!(matches!(rx.try_recv().unwrap(), HubEvent::Connected { client_id } if client_id == "c1"));
        assert!(hub.has_client("c1"));

        hub.unregister_client("c1", Some("bye".into()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            HubEvent::Disconnected { client_id, reason } if client_id == "c1" && reason.as_deref() == Some("bye")
        ));
        assert!(!hub.has_client("c1"));
    }

    #[test]
    fn unregister_unknown_client_is_noop() {
        let (hub, mut rx) = test_hub();
        hub.unregister_client("ghost", None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn receive_drops_unknown_client_silently() {
        let (hub, mut rx) = test_hub();
        hub.receive(Message::new("hello", Value::Null), "ghost");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn receive_known_client_emits_message_event() {
        let (hub, mut rx) = test_hub();
        hub.register_client("c1", "websocket", RecordingSink::new(), HashMap::new());
        let _ = rx.try_recv(); // drain Connected

        hub.receive(Message::new("chat", Value::Null), "c1");
        assert!(matches!(rx.try_recv().unwrap(), HubEvent::Message { client_id, .. } if client_id == "c1"));
    }

    #[test]
    fn join_room_refreshes_presence_rooms() {
        let (hub, _rx) = test_hub();
        hub.register_client("c1", "websocket", RecordingSink::new(), HashMap::new());

        hub.join_room("c1", "Lobby");
        assert_eq!(hub.presence_get("c1").unwrap().rooms, vec!["lobby".to_string()]);
        assert_eq!(hub.room_members("lobby"), vec!["c1".to_string()]);

        hub.leave_room("c1", "lobby");
        assert!(hub.presence_get("c1").unwrap().rooms.is_empty());
    }

    #[test]
    fn disconnect_leaves_rooms_before_presence_delete() {
        let (hub, _rx) = test_hub();
        hub.register_client("c1", "websocket", RecordingSink::new(), HashMap::new());
        hub.join_room("c1", "lobby");

        hub.unregister_client("c1", None);
        assert!(hub.room_members("lobby").is_empty());
        assert!(hub.presence_get("c1").is_none());
    }

    #[test]
    fn send_stamps_timestamp_and_reports_attempt() {
        let (hub, _rx) = test_hub();
        let sink = RecordingSink::new();
        hub.register_client("c1", "websocket", Arc::clone(&sink) as Arc<dyn ClientSink>, HashMap::new());

        let attempted = hub.send("c1", Message::new("hi", Value::Null));
        assert!(attempted);
        assert!(sink.sent.lock().unwrap()[0].timestamp.is_some());

        assert!(!hub.send("ghost", Message::new("hi", Value::Null)));
    }

    #[test]
    fn broadcast_excludes_sender_and_scopes_to_room() {
        let (hub, _rx) = test_hub();
        let s1 = RecordingSink::new();
        let s2 = RecordingSink::new();
        hub.register_client("c1", "websocket", Arc::clone(&s1) as Arc<dyn ClientSink>, HashMap::new());
        hub.register_client("c2", "websocket", Arc::clone(&s2) as Arc<dyn ClientSink>, HashMap::new());
        hub.join_room("c1", "lobby");
        hub.join_room("c2", "lobby");

        let mut except = HashSet::new();
        except.insert("c1".to_string());
        hub.broadcast(Message::new("chat", Value::Null), Some("lobby"), &except);

        assert!(s1.sent.lock().unwrap().is_empty());
        assert_eq!(s2.sent.lock().unwrap().len(), 1);
    }
}
