//! End-to-end signal routing scenarios (spec.md §8 scenario 5).

use std::{sync::Arc, time::Duration};

use beacon_core::{client::ClientSink, error::SinkError, logger::LogLevel, Kernel, Message};
use beacon_signaling::{SignalingBridge, SignalingConfig};
use serde_json::json;

#[derive(Debug)]
struct RecordingSink {
    sent: std::sync::Mutex<Vec<Message>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self { sent: std::sync::Mutex::new(Vec::new()) })
    }

    fn kinds(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.kind.clone()).collect()
    }
}

impl ClientSink for RecordingSink {
    fn send(&self, message: Message) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&self, _reason: Option<String>) {}
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn offer_without_target_or_room_gets_error() {
    let kernel = Kernel::new(LogLevel::Debug);
    SignalingBridge::new(SignalingConfig::default()).attach(&kernel);
    kernel.start().await.unwrap();

    let sink = RecordingSink::new();
    kernel.hub().register_client("a", "websocket", Arc::clone(&sink) as Arc<dyn ClientSink>, Default::default());

    kernel.hub().receive(Message::new("webrtc:offer", json!({ "description": { "sdp": "..." } })), "a");
    settle().await;

    assert_eq!(sink.kinds(), vec!["webrtc:error".to_string()]);
    assert_eq!(sink.sent.lock().unwrap()[0].payload["reason"], "TARGET_OR_ROOM_REQUIRED");

    kernel.stop().await;
}

#[tokio::test]
async fn offer_with_target_is_forwarded_only_to_that_peer() {
    let kernel = Kernel::new(LogLevel::Debug);
    SignalingBridge::new(SignalingConfig::default()).attach(&kernel);
    kernel.start().await.unwrap();

    let a_sink = RecordingSink::new();
    let b_sink = RecordingSink::new();
    kernel.hub().register_client("a", "websocket", Arc::clone(&a_sink) as Arc<dyn ClientSink>, Default::default());
    kernel.hub().register_client("b", "websocket", Arc::clone(&b_sink) as Arc<dyn ClientSink>, Default::default());

    kernel
        .hub()
        .receive(Message::new("webrtc:offer", json!({ "target": "b", "description": { "sdp": "..." } })), "a");
    settle().await;

    assert!(a_sink.sent.lock().unwrap().is_empty());
    assert_eq!(b_sink.kinds(), vec!["webrtc:offer".to_string()]);
    assert_eq!(b_sink.sent.lock().unwrap()[0].payload["from"], "a");

    kernel.stop().await;
}

#[tokio::test]
async fn candidate_without_candidate_field_is_rejected() {
    let kernel = Kernel::new(LogLevel::Debug);
    SignalingBridge::new(SignalingConfig::default()).attach(&kernel);
    kernel.start().await.unwrap();

    let sink = RecordingSink::new();
    kernel.hub().register_client("a", "websocket", Arc::clone(&sink) as Arc<dyn ClientSink>, Default::default());

    kernel.hub().receive(Message::new("webrtc:candidate", json!({ "target": "b" })), "a");
    settle().await;

    assert_eq!(sink.kinds(), vec!["webrtc:error".to_string()]);
    assert_eq!(sink.sent.lock().unwrap()[0].payload["reason"], "INVALID_CANDIDATE");

    kernel.stop().await;
}

#[tokio::test]
async fn auto_join_rooms_joins_originator_before_forwarding_offer() {
    let kernel = Kernel::new(LogLevel::Debug);
    SignalingBridge::new(SignalingConfig { auto_join_rooms: true, ..SignalingConfig::default() }).attach(&kernel);
    kernel.start().await.unwrap();

    let a_sink = RecordingSink::new();
    kernel.hub().register_client("a", "websocket", Arc::clone(&a_sink) as Arc<dyn ClientSink>, Default::default());

    kernel.hub().receive(
        Message::new("webrtc:offer", json!({ "room": "call-1", "description": { "sdp": "..." } })),
        "a",
    );
    settle().await;

    assert_eq!(kernel.rooms_for("a"), vec!["call-1".to_string()]);

    kernel.stop().await;
}
