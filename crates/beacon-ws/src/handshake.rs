//! HTTP Upgrade handshake (spec.md §4.5, §6).
//!
//! No HTTP library sits in front of this — the transport reads the raw
//! request line and headers itself and writes a hand-built 101 response.
//! Anything beyond the bytes needed to validate and accept the upgrade is
//! out of scope (static file serving, general HTTP routing: spec.md §1).

use base64::Engine;
use sha1::{Digest, Sha1};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Why an upgrade request was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// Missing or non-`websocket` `Upgrade` header.
    #[error("missing or invalid Upgrade header")]
    NotAnUpgrade,
    /// A path filter is configured and the request path doesn't match it.
    #[error("request path does not match configured prefix")]
    PathRejected,
    /// `Sec-WebSocket-Key` absent or empty.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    /// The request could not be parsed as HTTP at all.
    #[error("malformed request line or headers")]
    Malformed,
}

/// A parsed Upgrade request: just the parts the handshake needs.
#[derive(Debug)]
pub struct UpgradeRequest {
    /// Request path, e.g. `/chat`.
    pub path: String,
    /// Value of `Sec-WebSocket-Key`.
    pub key: String,
}

/// Parse the raw request line + headers of an HTTP Upgrade request.
/// `raw` must contain the full header block (terminated by `\r\n\r\n`,
/// which the caller strips before calling this).
pub fn parse_upgrade_request(raw: &str) -> Result<UpgradeRequest, HandshakeError> {
    let mut lines = raw.split("\r\n");
    let request_line = lines.next().ok_or(HandshakeError::Malformed)?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next().ok_or(HandshakeError::Malformed)?;
    let path = parts.next().ok_or(HandshakeError::Malformed)?.to_string();

    let mut upgrade = None;
    let mut key = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        match name.as_str() {
            "upgrade" => upgrade = Some(value.to_ascii_lowercase()),
            "sec-websocket-key" => key = Some(value.to_string()),
            _ => {},
        }
    }

    if upgrade.as_deref() != Some("websocket") {
        return Err(HandshakeError::NotAnUpgrade);
    }

    let key = key.filter(|k| !k.is_empty()).ok_or(HandshakeError::MissingKey)?;

    Ok(UpgradeRequest { path, key })
}

/// Reject requests whose path doesn't start with `prefix`, if configured.
pub fn check_path(request: &UpgradeRequest, prefix: Option<&str>) -> Result<(), HandshakeError> {
    match prefix {
        Some(prefix) if !request.path.starts_with(prefix) => Err(HandshakeError::PathRejected),
        _ => Ok(()),
    }
}

/// Compute `Sec-WebSocket-Accept` = Base64(SHA1(key ‖ GUID)).
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Build the full 101 response, including the terminating blank line.
pub fn build_accept_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_matches_rfc6455_test_vector() {
        assert_eq!(compute_accept("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn parses_well_formed_request() {
        let raw = "GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n";
        let req = parse_upgrade_request(raw).unwrap();
        assert_eq!(req.path, "/chat");
        assert_eq!(req.key, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn rejects_missing_upgrade_header() {
        let raw = "GET /chat HTTP/1.1\r\nHost: example.com\r\n";
        assert_eq!(parse_upgrade_request(raw).unwrap_err(), HandshakeError::NotAnUpgrade);
    }

    #[test]
    fn rejects_empty_key() {
        let raw = "GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: \r\n";
        assert_eq!(parse_upgrade_request(raw).unwrap_err(), HandshakeError::MissingKey);
    }

    #[test]
    fn rejects_path_outside_prefix() {
        let request = UpgradeRequest { path: "/other".to_string(), key: "x".to_string() };
        assert_eq!(check_path(&request, Some("/chat")).unwrap_err(), HandshakeError::PathRejected);
        assert!(check_path(&request, None).is_ok());
    }

    #[test]
    fn response_contains_standard_headers_and_blank_line() {
        let response = build_accept_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
