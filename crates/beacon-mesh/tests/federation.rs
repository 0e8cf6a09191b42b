//! End-to-end hello handshake and federation between two mesh nodes
//! (spec.md §8 "Mesh federation" scenario, and the "exactly one ready
//! client per nodeId" property).

use std::{sync::Arc, time::Duration};

use beacon_core::{logger::LogLevel, Kernel, Logger};
use beacon_mesh::{MeshConfig, MeshTransport};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn two_nodes_exchange_hello_and_see_one_synthetic_client_each() {
    let n1_port = 29_090;
    let n2_port = 29_091;

    let n1 = Kernel::new(LogLevel::Debug);
    let n1_config = MeshConfig {
        node_id: "node-1".to_string(),
        host: "127.0.0.1".to_string(),
        port: n1_port,
        peers: vec![format!("127.0.0.1:{n2_port}")],
        reconnect_interval_ms: 200,
    };
    n1.use_transport(Arc::new(MeshTransport::new(n1_config, Logger::new(LogLevel::Debug)))).await.unwrap();

    let n2 = Kernel::new(LogLevel::Debug);
    let n2_config = MeshConfig {
        node_id: "node-2".to_string(),
        host: "127.0.0.1".to_string(),
        port: n2_port,
        peers: vec![format!("127.0.0.1:{n1_port}")],
        reconnect_interval_ms: 200,
    };
    n2.use_transport(Arc::new(MeshTransport::new(n2_config, Logger::new(LogLevel::Debug)))).await.unwrap();

    n1.start().await.unwrap();
    n2.start().await.unwrap();

    settle().await;

    let n1_presence = n1.presence();
    let n2_presence = n2.presence();

    assert_eq!(n1_presence.len(), 1, "node-1 should see exactly one synthetic peer client");
    assert_eq!(n1_presence[0].id, "mesh:node-2");
    assert_eq!(n1_presence[0].transport, "mesh");

    assert_eq!(n2_presence.len(), 1, "node-2 should see exactly one synthetic peer client");
    assert_eq!(n2_presence[0].id, "mesh:node-1");

    n1.stop().await;
    n2.stop().await;
}

#[tokio::test]
async fn message_sent_through_synthetic_peer_client_arrives_as_inbound_on_the_other_node() {
    let n1_port = 29_190;
    let n2_port = 29_191;

    let n1 = Kernel::new(LogLevel::Debug);
    n1.use_transport(Arc::new(MeshTransport::new(
        MeshConfig {
            node_id: "alpha".to_string(),
            host: "127.0.0.1".to_string(),
            port: n1_port,
            peers: vec![format!("127.0.0.1:{n2_port}")],
            reconnect_interval_ms: 200,
        },
        Logger::new(LogLevel::Debug),
    )))
    .await
    .unwrap();

    let n2 = Kernel::new(LogLevel::Debug);
    let received = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let received_for_handler = Arc::clone(&received);
    n2.on("ping", move |toolkit, message| {
        let received = Arc::clone(&received_for_handler);
        async move {
            assert_eq!(toolkit.client_id(), "mesh:alpha");
            received.lock().await.push(message.kind.clone());
            Ok(())
        }
    });
    n2.use_transport(Arc::new(MeshTransport::new(
        MeshConfig {
            node_id: "beta".to_string(),
            host: "127.0.0.1".to_string(),
            port: n2_port,
            peers: vec![format!("127.0.0.1:{n1_port}")],
            reconnect_interval_ms: 200,
        },
        Logger::new(LogLevel::Debug),
    )))
    .await
    .unwrap();

    n1.start().await.unwrap();
    n2.start().await.unwrap();
    settle().await;

    let sent = n1.hub().send("mesh:beta", beacon_core::Message::new("ping", serde_json::Value::Null));
    assert!(sent);

    settle().await;
    assert_eq!(*received.lock().await, vec!["ping".to_string()]);

    n1.stop().await;
    n2.stop().await;
}
