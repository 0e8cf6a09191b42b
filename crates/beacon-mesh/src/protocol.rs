//! Line-delimited envelope protocol spoken between mesh peers (spec.md
//! §4.6, §6 "Peer-mesh wire protocol"). UTF-8, one JSON object per `\n`
//! terminated line; no length prefix, no other framing.

use beacon_core::message::Message;
use serde::{Deserialize, Serialize};

/// One line of the mesh protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    /// Handshake: announces the sender's node id.
    Hello {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    /// A relayed [`Message`].
    Message { message: Message },
}

impl Envelope {
    /// Serialize to a single `\n`-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse a single line (without its trailing newline).
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Drain every complete `\n`-terminated line currently buffered, leaving any
/// trailing partial line in `buf`. Empty lines are dropped (spec.md §4.6).
pub fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buf.drain(0..=pos).collect();
        let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
        let text = text.trim_end_matches('\r');
        if !text.is_empty() {
            lines.push(text.to_string());
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn hello_round_trips_exact_shape() {
        let envelope = Envelope::Hello { node_id: "abc-123".to_string() };
        let line = envelope.to_line().unwrap();
        assert_eq!(line, "{\"kind\":\"hello\",\"nodeId\":\"abc-123\"}\n");

        let parsed = Envelope::from_line(line.trim_end()).unwrap();
        assert!(matches!(parsed, Envelope::Hello { node_id } if node_id == "abc-123"));
    }

    #[test]
    fn message_envelope_round_trips() {
        let envelope = Envelope::Message { message: Message::new("chat:message", Value::String("hi".into())) };
        let line = envelope.to_line().unwrap();
        let parsed = Envelope::from_line(line.trim_end()).unwrap();
        match parsed {
            Envelope::Message { message } => assert_eq!(message.kind, "chat:message"),
            Envelope::Hello { .. } => panic!("expected message envelope"),
        }
    }

    #[test]
    fn drain_lines_keeps_trailing_partial_and_skips_blank() {
        let mut buf = b"{\"kind\":\"hello\",\"nodeId\":\"a\"}\n\n{\"kind\":\"hello\",\"nodeId\":\"b".to_vec();
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["{\"kind\":\"hello\",\"nodeId\":\"a\"}".to_string()]);
        assert_eq!(buf, b"{\"kind\":\"hello\",\"nodeId\":\"b".to_vec());
    }
}
