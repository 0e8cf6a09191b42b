//! Wire-level message shape (spec.md §3 "Message").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `target` may address one client id or several. No core path currently
/// consumes the envelope-level target (spec.md §9 open question) — only the
/// signaling bridge inspects `payload.target`. Preserved here as a no-op
/// field rather than invented into routing semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// A single client id.
    One(String),
    /// Several client ids.
    Many(Vec<String>),
}

/// A routable message, inbound or outbound.
///
/// `timestamp` is absent on inbound wire messages and always present on
/// anything the [`crate::hub::Hub`] has sent, per the invariant in spec.md
/// §3 ("Outbound messages always carry a Hub-assigned timestamp").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing key. Must be non-empty for a message to be dispatched.
    #[serde(rename = "type")]
    pub kind: String,

    /// Arbitrary structured payload.
    #[serde(default = "default_payload")]
    pub payload: Value,

    /// Optional envelope-level target; see [`Target`].
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<Target>,

    /// Optional room name (case-insensitive; canonicalized on use, not on
    /// the wire).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub room: Option<String>,

    /// Correlation token. If present, the kernel guarantees exactly one
    /// `system:ack` after all handlers for this message complete.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ack: Option<String>,

    /// Milliseconds since the Unix epoch, stamped by the Hub at send time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<u64>,
}

fn default_payload() -> Value {
    Value::Null
}

impl Message {
    /// Build a message with just a type and payload; all other fields unset.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            target: None,
            room: None,
            ack: None,
            timestamp: None,
        }
    }

    /// `true` if `kind` is non-empty, the only wire-level validity
    /// requirement spec.md §3 places on `type`.
    pub fn has_valid_type(&self) -> bool {
        !self.kind.is_empty()
    }

    /// Parse a UTF-8 JSON payload into a [`Message`]. Returns `None` on
    /// malformed JSON or a missing/empty `type`, matching spec.md §4.5's
    /// "drop silently ... logging an error" contract — callers log, this
    /// function just reports absence.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let message: Message = serde_json::from_slice(bytes).ok()?;
        if message.has_valid_type() { Some(message) } else { None }
    }

    /// Serialize to a JSON byte vector.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// A `system:reply` message carrying `{message}`.
    pub fn system_reply(text: impl Into<String>) -> Self {
        Self::new("system:reply", serde_json::json!({ "message": text.into() }))
    }

    /// A `system:ack` message carrying `{ack}`.
    pub fn system_ack(token: impl Into<String>) -> Self {
        Self::new("system:ack", serde_json::json!({ "ack": token.into() }))
    }

    /// A `system:error` message carrying `{message, details?}`.
    pub fn system_error(message: impl Into<String>, details: Option<String>) -> Self {
        let mut payload = serde_json::json!({ "message": message.into() });
        if let Some(details) = details {
            payload["details"] = Value::String(details);
        }
        Self::new("system:error", payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_type() {
        assert!(Message::parse(br#"{"payload":1}"#).is_none());
    }

    #[test]
    fn rejects_empty_type() {
        assert!(Message::parse(br#"{"type":""}"#).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Message::parse(b"not json").is_none());
    }

    #[test]
    fn round_trips_a_well_formed_message() {
        let raw = br#"{"type":"chat:message","payload":"hi","room":"Lobby","ack":"1"}"#;
        let message = Message::parse(raw).expect("valid message");
        assert_eq!(message.kind, "chat:message");
        assert_eq!(message.room.as_deref(), Some("Lobby"));
        assert_eq!(message.ack.as_deref(), Some("1"));
        assert!(message.timestamp.is_none());
    }

    #[test]
    fn system_ack_carries_token() {
        let ack = Message::system_ack("tok");
        assert_eq!(ack.kind, "system:ack");
        assert_eq!(ack.payload["ack"], "tok");
    }
}
