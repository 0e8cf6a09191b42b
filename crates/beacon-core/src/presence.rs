//! Presence directory (spec.md §4.2).
//!
//! Mirrors every connected client's identity, metadata, and rooms. Refreshed
//! on connect, disconnect, metadata update, and room change; the Hub is the
//! only caller that should mutate this — everything else gets a read-only
//! snapshot.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// A point-in-time view of one connected client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PresenceSnapshot {
    /// Client id.
    pub id: String,
    /// Transport tag (`"websocket"`, `"mesh"`, ...).
    pub transport: String,
    /// Open string-keyed metadata map.
    pub metadata: HashMap<String, Value>,
    /// Milliseconds since epoch at connect time.
    pub connected_at_ms: u64,
    /// Rooms the client currently belongs to.
    pub rooms: Vec<String>,
}

/// Directory of connected clients, keyed by client id.
#[derive(Debug, Default)]
pub struct PresenceStore {
    clients: HashMap<String, PresenceSnapshot>,
}

impl PresenceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly-connected client.
    pub fn connect(&mut self, snapshot: PresenceSnapshot) {
        self.clients.insert(snapshot.id.clone(), snapshot);
    }

    /// Remove a client. No-op if unknown.
    pub fn disconnect(&mut self, id: &str) {
        self.clients.remove(id);
    }

    /// Snapshot for a single client.
    pub fn get(&self, id: &str) -> Option<PresenceSnapshot> {
        self.clients.get(id).cloned()
    }

    /// Every currently-connected client's snapshot. Order is unspecified.
    pub fn list(&self) -> Vec<PresenceSnapshot> {
        self.clients.values().cloned().collect()
    }

    /// Shallow-merge `metadata` into the client's existing metadata.
    /// Idempotent by value, and never recreates a snapshot for an unknown
    /// client.
    pub fn update(&mut self, id: &str, metadata: HashMap<String, Value>) {
        if let Some(snapshot) = self.clients.get_mut(id) {
            snapshot.metadata.extend(metadata);
        }
    }

    /// Replace a client's `rooms` list in place. No-op if unknown.
    pub fn sync_rooms(&mut self, id: &str, rooms: Vec<String>) {
        if let Some(snapshot) = self.clients.get_mut(id) {
            snapshot.rooms = rooms;
        }
    }

    /// Number of currently-tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// `true` if no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
