//! Room membership (spec.md §4.1).
//!
//! Maintains two mappings — room → client ids, client id → rooms — so both
//! directions are O(1). Room names are case-insensitive; the canonical form
//! is lowercased on every operation. An empty room (no members) is dropped
//! entirely rather than kept around as an empty set.

use std::collections::{HashMap, HashSet};

/// Bidirectional room membership map.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<String, HashSet<String>>,
    client_rooms: HashMap<String, HashSet<String>>,
}

impl RoomManager {
    /// Create an empty room manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client_id` to `room`. A no-op if `room` is empty after
    /// trimming is NOT performed — only a literally empty string is
    /// rejected, matching spec.md's "no-op on empty room string".
    pub fn join(&mut self, room: &str, client_id: &str) {
        if room.is_empty() {
            return;
        }
        let room = room.to_lowercase();
        self.rooms.entry(room.clone()).or_default().insert(client_id.to_string());
        self.client_rooms.entry(client_id.to_string()).or_default().insert(room);
    }

    /// Remove `client_id` from `room`. Garbage-collects the room entry if it
    /// becomes empty.
    pub fn leave(&mut self, room: &str, client_id: &str) {
        if room.is_empty() {
            return;
        }
        let room = room.to_lowercase();

        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(client_id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }

        if let Some(rooms) = self.client_rooms.get_mut(client_id) {
            rooms.remove(&room);
            if rooms.is_empty() {
                self.client_rooms.remove(client_id);
            }
        }
    }

    /// Remove `client_id` from every room it currently belongs to.
    pub fn leave_all(&mut self, client_id: &str) {
        let Some(rooms) = self.client_rooms.remove(client_id) else {
            return;
        };
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(client_id);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
    }

    /// Client ids currently in `room`. Empty if the room has no members (or
    /// never existed) — the two are indistinguishable by design, since
    /// empty rooms are never retained.
    pub fn list(&self, room: &str) -> Vec<String> {
        let room = room.to_lowercase();
        self.rooms.get(&room).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Rooms `client_id` currently belongs to.
    pub fn rooms_for(&self, client_id: &str) -> Vec<String> {
        self.client_rooms.get(client_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Total number of non-empty rooms. Used for diagnostics logging.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
