//! End-to-end check that a raw TCP client can perform the WebSocket
//! handshake against [`WsTransport`] and round-trip a chat message through
//! a registered kernel handler (spec.md §8 scenario 1, minus the second
//! participant).

use std::{sync::Arc, time::Duration};

use beacon_core::{
    kernel::{ReplyOverrides, RoomBroadcastOptions},
    logger::LogLevel,
    Kernel, Logger, Message,
};
use beacon_ws::{WsConfig, WsTransport};
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

fn mask_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mask = [0x01, 0x02, 0x03, 0x04];
    let mut out = vec![0x80 | opcode];
    let len = payload.len();
    assert!(len < 126, "test helper only handles short payloads");
    out.push(0x80 | len as u8);
    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

fn expected_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, hasher.finalize())
}

#[tokio::test]
async fn chat_join_and_echo_round_trip() {
    let kernel = Kernel::new(LogLevel::Debug);
    kernel.on("chat:join", |toolkit, message| async move {
        let room = message.room.clone().unwrap_or_default();
        toolkit.rooms().join(&room);
        toolkit.reply(Message::system_ack(message.ack.clone().unwrap_or_default()), ReplyOverrides::default());
        Ok(())
    });
    kernel.on("chat:message", |toolkit, message| async move {
        let mut options = RoomBroadcastOptions::default();
        options.except_self = true;
        toolkit.rooms().broadcast(
            Message::new("chat:message", serde_json::json!({"from": toolkit.client_id(), "body": message.payload})),
            None,
            options,
        );
        Ok(())
    });

    let port = 27_070;
    let transport = Arc::new(WsTransport::new(WsConfig::with_port(port), Logger::new(LogLevel::Debug)));
    kernel.use_transport(transport).await.unwrap();
    kernel.start().await.unwrap();

    // Give the accept loop a moment to start listening.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    let request = format!(
        "GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {key}\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = [0u8; 512];
    let n = stream.read(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response[..n]);
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols"));
    assert!(response.contains(&expected_accept(key)));

    let join = serde_json::json!({"type": "chat:join", "room": "lobby", "ack": "1"}).to_string();
    stream.write_all(&mask_frame(0x1, join.as_bytes())).await.unwrap();

    let mut buf = [0u8; 512];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(n > 2, "expected a framed ack reply");

    kernel.stop().await;
}
