//! Dispatch kernel (spec.md §4.4).
//!
//! Holds the handler registry (typed + wildcard buckets, spec.md §9 design
//! note: kept as two collections rather than a map with a sentinel key, so
//! dispatch order — typed first, wildcard after — stays deterministic),
//! drives the transports plugged in via [`Kernel::use_transport`], and
//! drains the Hub's event channel from a single worker task so per-client
//! FIFO holds without extra locking (spec.md §9).

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    client::Transport,
    error::KernelError,
    hub::{Hub, HubEvent},
    logger::{LogLevel, Logger},
    message::{Message, Target},
    presence::PresenceSnapshot,
};

/// Error a handler returns to signal failure. Isolated per handler
/// (spec.md §4.4 step 5) — never aborts the kernel or other handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
type HandlerEntry = Arc<dyn Fn(Toolkit, Message) -> HandlerFuture + Send + Sync>;
type HandlerMap = Arc<Mutex<HashMap<String, Vec<HandlerEntry>>>>;
type WildcardList = Arc<Mutex<Vec<HandlerEntry>>>;

/// What `on` registers against: a concrete event type, or the wildcard
/// bucket (`"*"`).
#[derive(Debug, Clone)]
pub enum EventKind {
    /// A concrete `message.type` value.
    Type(String),
    /// The wildcard bucket, applied to every event after typed handlers.
    Wildcard,
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        if s == "*" { Self::Wildcard } else { Self::Type(s.to_string()) }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        if s == "*" { Self::Wildcard } else { Self::Type(s) }
    }
}

/// Substitute `[placeholder]` tokens in `template`, in order, with `params`.
/// Fails if the number of placeholders and parameters differ (spec.md
/// §4.4: "substitution count must match placeholder count or the
/// registration fails").
fn substitute_template(template: &str, params: &[&str]) -> Result<String, KernelError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut param_iter = params.iter();
    let mut placeholder_count = 0usize;

    while let Some(c) = chars.next() {
        if c == '[' {
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == ']' {
                    break;
                }
            }
            placeholder_count += 1;
            if let Some(value) = param_iter.next() {
                result.push_str(value);
            }
        } else {
            result.push(c);
        }
    }

    if placeholder_count != params.len() {
        return Err(KernelError::ParamCountMismatch {
            template: template.to_string(),
            expected: placeholder_count,
            got: params.len(),
        });
    }

    Ok(result)
}

/// Fields merged onto a [`Toolkit::reply`] message after it is built, last
/// write wins (spec.md §4.4: "object form is sent as-is with overrides
/// merged last").
#[derive(Debug, Clone, Default)]
pub struct ReplyOverrides {
    /// Overrides the message's `room` field.
    pub room: Option<String>,
    /// Overrides the message's `ack` field.
    pub ack: Option<String>,
    /// Overrides the message's envelope-level `target` field.
    pub target: Option<Target>,
}

impl ReplyOverrides {
    fn apply(self, mut message: Message) -> Message {
        if let Some(room) = self.room {
            message.room = Some(room);
        }
        if let Some(ack) = self.ack {
            message.ack = Some(ack);
        }
        if let Some(target) = self.target {
            message.target = Some(target);
        }
        message
    }
}

/// Options for [`RoomToolkit::broadcast`].
#[derive(Debug, Clone, Default)]
pub struct RoomBroadcastOptions {
    /// Add the originating client to the exclusion set.
    pub except_self: bool,
    /// Additional client ids to exclude.
    pub except: HashSet<String>,
}

/// Room operations scoped to the invocation that produced this [`Toolkit`].
#[derive(Clone)]
pub struct RoomToolkit {
    toolkit: Toolkit,
}

impl RoomToolkit {
    /// Join the originating client to `room`.
    pub fn join(&self, room: &str) {
        self.toolkit.hub.join_room(&self.toolkit.client_id, room);
    }

    /// Remove the originating client from `room`.
    pub fn leave(&self, room: &str) {
        self.toolkit.hub.leave_room(&self.toolkit.client_id, room);
    }

    /// Client ids currently in `room`.
    pub fn list(&self, room: &str) -> Vec<String> {
        self.toolkit.hub.room_members(room)
    }

    /// Broadcast to `room` (defaulting to the triggering message's `room`
    /// field). A no-op if no room can be resolved (spec.md §9 open
    /// question, codified as intentional).
    pub fn broadcast(&self, message: Message, room: Option<&str>, options: RoomBroadcastOptions) {
        let resolved = room.map(str::to_string).or_else(|| self.toolkit.message_room.clone());
        let Some(room) = resolved else {
            return;
        };

        let mut except = options.except;
        if options.except_self {
            except.insert(self.toolkit.client_id.clone());
        }
        self.toolkit.hub.broadcast(message, Some(&room), &except);
    }
}

/// Presence operations scoped to the invocation that produced this
/// [`Toolkit`].
#[derive(Clone)]
pub struct PresenceToolkit {
    toolkit: Toolkit,
}

impl PresenceToolkit {
    /// Snapshot of every connected client.
    pub fn list(&self) -> Vec<PresenceSnapshot> {
        self.toolkit.hub.presence_list()
    }

    /// Snapshot of a single client.
    pub fn get(&self, id: &str) -> Option<PresenceSnapshot> {
        self.toolkit.hub.presence_get(id)
    }

    /// Shallow-merge `metadata` into the originating client's presence
    /// entry.
    pub fn update(&self, metadata: HashMap<String, serde_json::Value>) {
        if let Err(err) = self.toolkit.hub.presence_update(&self.toolkit.client_id, metadata) {
            self.toolkit.logger.scoped(&self.toolkit.client_id).error(format!("presence update failed: {err}"));
        }
    }
}

/// Per-invocation capability bundle passed to handlers (spec.md §9 design
/// note: a value object with a back-pointer to the hub and the originating
/// client id, rather than a closure capturing the kernel).
#[derive(Clone)]
pub struct Toolkit {
    hub: Arc<Hub>,
    client_id: String,
    message_room: Option<String>,
    logger: Logger,
}

impl Toolkit {
    fn new(hub: Arc<Hub>, client_id: String, message_room: Option<String>, logger: Logger) -> Self {
        Self { hub, client_id, message_room, logger }
    }

    /// The client id that triggered this invocation.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Reply to the originator with a `system:reply` message.
    pub fn reply_text(&self, text: impl Into<String>) {
        self.hub.send(&self.client_id, Message::system_reply(text));
    }

    /// Reply to the originator with a fully-formed message, merging
    /// `overrides` onto it last (spec.md §4.4 `reply(msg|string, overrides?)`).
    pub fn reply(&self, message: Message, overrides: ReplyOverrides) {
        self.hub.send(&self.client_id, overrides.apply(message));
    }

    /// Unicast `message` to `target`. Returns whether delivery was
    /// attempted.
    pub fn send(&self, target: &str, message: Message) -> bool {
        self.hub.send(target, message)
    }

    /// Broadcast to every registered client (no room scope).
    pub fn broadcast(&self, message: Message) {
        self.hub.broadcast(message, None, &HashSet::new());
    }

    /// Broadcast to every client whose presence snapshot matches `filter`.
    pub fn broadcast_filtered(&self, message: Message, filter: impl Fn(&PresenceSnapshot) -> bool) {
        for snapshot in self.hub.presence_list() {
            if filter(&snapshot) {
                self.hub.send(&snapshot.id, message.clone());
            }
        }
    }

    /// Room operations scoped to this invocation.
    pub fn rooms(&self) -> RoomToolkit {
        RoomToolkit { toolkit: self.clone() }
    }

    /// Presence operations scoped to this invocation.
    pub fn presence(&self) -> PresenceToolkit {
        PresenceToolkit { toolkit: self.clone() }
    }

    /// Debug log scoped to the originating client.
    pub fn log(&self, message: impl std::fmt::Display) {
        self.logger.scoped(&self.client_id).debug(message);
    }
}

async fn dispatch(
    hub: Arc<Hub>,
    logger: Logger,
    handlers: HandlerMap,
    wildcard: WildcardList,
    message: Message,
    client_id: String,
) {
    let mut matched: Vec<HandlerEntry> =
        handlers.lock().expect("handler registry poisoned").get(&message.kind).cloned().unwrap_or_default();
    matched.extend(wildcard.lock().expect("wildcard registry poisoned").iter().cloned());

    if matched.is_empty() {
        logger.scoped(&client_id).debug(format!("no handlers registered for {:?}", message.kind));
        if let Some(ack) = &message.ack {
            hub.send(&client_id, Message::system_ack(ack.clone()));
        }
        return;
    }

    // Race with disconnect: if the presence entry is already gone, abort
    // silently (spec.md §4.4 step 3).
    if hub.presence_get(&client_id).is_none() {
        return;
    }

    let toolkit = Toolkit::new(Arc::clone(&hub), client_id.clone(), message.room.clone(), logger.clone());

    for handler in matched {
        if let Err(err) = handler(toolkit.clone(), message.clone()).await {
            logger.scoped(&client_id).error(format!("handler failed: {err}"));
            hub.send(&client_id, Message::system_error("Internal handler error", Some(err.to_string())));
        }
    }

    if let Some(ack) = &message.ack {
        hub.send(&client_id, Message::system_ack(ack.clone()));
    }
}

/// The dispatch kernel: handler registry, transport lifecycle, and the
/// single worker that drains the Hub's event channel.
pub struct Kernel {
    hub: Arc<Hub>,
    handlers: HandlerMap,
    wildcard: WildcardList,
    transports: Mutex<Vec<Arc<dyn Transport>>>,
    started: AtomicBool,
    logger: Logger,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<HubEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Kernel {
    /// Build a kernel with no transports and no registered handlers.
    pub fn new(log_level: LogLevel) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let logger = Logger::new(log_level);
        let hub = Arc::new(Hub::new(tx, logger.clone()));

        Self {
            hub,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            wildcard: Arc::new(Mutex::new(Vec::new())),
            transports: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            logger,
            events_rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        }
    }

    /// The Hub this kernel dispatches against. Transports register clients
    /// with it directly; the kernel never exposes the Hub as a place
    /// transports reach back into the kernel through.
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Plug in a transport. If the kernel has already started, the
    /// transport is started immediately.
    pub async fn use_transport(&self, transport: Arc<dyn Transport>) -> Result<(), KernelError> {
        self.transports.lock().expect("transport registry poisoned").push(Arc::clone(&transport));
        if self.started.load(Ordering::Acquire) {
            transport.start(Arc::clone(&self.hub)).await?;
        }
        Ok(())
    }

    /// Register a handler for a concrete type or the wildcard bucket.
    pub fn on<E, F, Fut>(&self, event: E, handler: F)
    where
        E: Into<EventKind>,
        F: Fn(Toolkit, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let entry: HandlerEntry = Arc::new(move |toolkit, message| Box::pin(handler(toolkit, message)));
        match event.into() {
            EventKind::Wildcard => self.wildcard.lock().expect("wildcard registry poisoned").push(entry),
            EventKind::Type(kind) => {
                self.handlers.lock().expect("handler registry poisoned").entry(kind).or_default().push(entry);
            },
        }
    }

    /// Register a handler against a bracketed template (e.g.
    /// `"chat:join:[roomId]"`), substituting `params` in order.
    pub fn on_template<F, Fut>(&self, template: &str, params: &[&str], handler: F) -> Result<(), KernelError>
    where
        F: Fn(Toolkit, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let concrete = substitute_template(template, params)?;
        self.on(EventKind::Type(concrete), handler);
        Ok(())
    }

    /// Start every registered transport and the dispatch worker. Idempotent.
    pub async fn start(&self) -> Result<(), KernelError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(mut rx) = self.events_rx.lock().expect("events_rx poisoned").take() {
            let hub = Arc::clone(&self.hub);
            let handlers = Arc::clone(&self.handlers);
            let wildcard = Arc::clone(&self.wildcard);
            let logger = self.logger.clone();

            let handle = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        HubEvent::Connected { client_id } => {
                            logger.scoped(&client_id).info("client connected");
                        },
                        HubEvent::Disconnected { client_id, reason } => {
                            logger.scoped(&client_id).info(format!("client disconnected: {reason:?}"));
                        },
                        HubEvent::Message { message, client_id } => {
                            dispatch(
                                Arc::clone(&hub),
                                logger.clone(),
                                Arc::clone(&handlers),
                                Arc::clone(&wildcard),
                                message,
                                client_id,
                            )
                            .await;
                        },
                    }
                }
            });
            *self.worker.lock().expect("worker poisoned") = Some(handle);
        }

        let transports: Vec<Arc<dyn Transport>> = self.transports.lock().expect("transport registry poisoned").clone();
        let hub = Arc::clone(&self.hub);
        let results = futures::future::join_all(transports.iter().map(|transport| {
            let hub = Arc::clone(&hub);
            async move { transport.start(hub).await }
        }))
        .await;

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Stop every transport, then the dispatch worker. Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        let transports: Vec<Arc<dyn Transport>> = self.transports.lock().expect("transport registry poisoned").clone();
        futures::future::join_all(transports.iter().map(|transport| transport.stop())).await;

        if let Some(handle) = self.worker.lock().expect("worker poisoned").take() {
            handle.abort();
        }
    }

    /// Read-only presence accessor (spec.md §6 "Accessors presence, rooms").
    pub fn presence(&self) -> Vec<PresenceSnapshot> {
        self.hub.presence_list()
    }

    /// Read-only room membership accessor for a single client.
    pub fn rooms_for(&self, client_id: &str) -> Vec<String> {
        self.hub.rooms_for(client_id)
    }

    /// Read-only room membership accessor for a single room.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        self.hub.room_members(room)
    }

    /// Number of rooms with at least one member, for periodic diagnostics
    /// logging (SPEC_FULL.md §4 "room listing and presence listing").
    pub fn room_count(&self) -> usize {
        self.hub.room_count()
    }
}
