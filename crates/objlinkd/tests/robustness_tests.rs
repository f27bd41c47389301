//! Robustness tests for the object server.
//!
//! These tests verify the server handles bad input and connection churn
//! gracefully:
//! - Malformed frames with and without a recoverable id
//! - Binary and oversized frames
//! - Connection limits and rapid connect/disconnect
//! - Sustained call traffic on one session
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::time::Duration;

use common::{app_root, test_config, TestServer};
use objlink_client::{ClientError, ObjectClient};
use objlink_protocol::{CallId, CallStatus, ServerMessage};
use objlinkd::ServerConfig;
use serde_json::json;
use tokio::time::timeout;

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_json_is_dropped() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    let app = app_root(&mut client).await;

    client.send_text("{this is not json").await.unwrap();

    // Nothing was sent for the bad frame, so the next message belongs to this call
    let reply = client.call(app, "add_one", vec![json!(1)]).await.unwrap();
    assert_eq!(reply.id, CallId::from(2));
    assert_eq!(reply.payload, json!(2));

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_call_with_id_gets_error_result() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send_text(r#"{"name": "get_root", "args": [], "id": 77}"#)
        .await
        .unwrap();

    let ack = client.recv().await.unwrap();
    assert_eq!(ack, ServerMessage::ack(CallId::from(77)));

    match client.recv().await.unwrap() {
        ServerMessage::Result {
            id,
            status,
            payload,
        } => {
            assert_eq!(id, CallId::from(77));
            assert_eq!(status, CallStatus::Error);
            assert!(payload
                .as_str()
                .unwrap()
                .starts_with("malformed call message"));
        }
        other => panic!("expected error result, got {other:?}"),
    }

    // Session still usable
    let root = client.root_id().unwrap();
    let reply = client.call(root, "object_count", vec![]).await.unwrap();
    assert!(reply.is_success());

    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_id_is_dropped() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    let root = client.root_id().unwrap();

    client
        .send_text(format!(r#"{{"that": {}, "name": "object_count"}}"#, root.get()))
        .await
        .unwrap();

    let reply = client.call(root, "object_count", vec![]).await.unwrap();
    assert_eq!(reply.id, CallId::from(1));

    server.shutdown().await;
}

#[tokio::test]
async fn test_binary_frame_is_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    let app = app_root(&mut client).await;

    client.send_binary(vec![0xde, 0xad, 0xbe, 0xef]).await.unwrap();

    let reply = client.call(app, "add_one", vec![json!(9)]).await.unwrap();
    assert_eq!(reply.payload, json!(10));

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_with_id_gets_error_result() {
    let config = ServerConfig {
        max_message_bytes: 256,
        ..test_config()
    };
    let server = TestServer::spawn_with_config(config).await;
    let mut client = server.connect().await;
    let app = app_root(&mut client).await;

    let big = "x".repeat(1024);
    let text = format!(
        r#"{{"that": {}, "name": "echo", "args": ["{big}"], "id": "big"}}"#,
        app.get()
    );
    client.send_text(text).await.unwrap();

    let reply = client.await_reply(&CallId::from("big")).await.unwrap();
    assert_eq!(reply.status, CallStatus::Error);
    let message = reply.error_message().unwrap();
    assert!(message.starts_with("malformed call message"), "{message}");
    assert!(message.contains("exceeds limit of 256 bytes"), "{message}");

    let reply = client.call(app, "add_one", vec![json!(0)]).await.unwrap();
    assert_eq!(reply.payload, json!(1));

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_without_id_is_dropped() {
    let config = ServerConfig {
        max_message_bytes: 256,
        ..test_config()
    };
    let server = TestServer::spawn_with_config(config).await;
    let mut client = server.connect().await;
    let app = app_root(&mut client).await;

    client.send_text("y".repeat(1024)).await.unwrap();

    // Nothing was sent for the bad frame, so the next message belongs to this call
    let reply = client.call(app, "add_one", vec![json!(0)]).await.unwrap();
    assert_eq!(reply.payload, json!(1));

    server.shutdown().await;
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn().await;

    for _ in 0..20 {
        let client = server.connect().await;
        client.close().await.unwrap();
    }

    let mut client = server.connect().await;
    let app = app_root(&mut client).await;
    let reply = client.call(app, "add_one", vec![json!(41)]).await.unwrap();
    assert_eq!(reply.payload, json!(42));

    server.shutdown().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let config = ServerConfig {
        max_connections: 1,
        ..test_config()
    };
    let server = TestServer::spawn_with_config(config).await;
    let _first = server.connect().await;

    let second = ObjectClient::connect_with_timeout(&server.url, Duration::from_secs(2)).await;
    assert!(matches!(
        second,
        Err(ClientError::Connect { .. }) | Err(ClientError::Closed) | Err(ClientError::Transport(_))
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_dropped_client_does_not_affect_others() {
    let server = TestServer::spawn().await;
    let mut stable = server.connect().await;
    let app = app_root(&mut stable).await;

    {
        let mut doomed = server.connect().await;
        let doomed_app = app_root(&mut doomed).await;
        let call = objlink_protocol::CallMessage::new(doomed_app, "sleep_ms", vec![json!(200)], 1u64);
        doomed.send_call(&call).await.unwrap();
        // Dropped mid-call
    }

    let reply = stable.call(app, "add_one", vec![json!(5)]).await.unwrap();
    assert_eq!(reply.payload, json!(6));

    server.shutdown().await;
}

// ============================================================================
// Load Tests
// ============================================================================

#[tokio::test]
async fn test_many_sequential_calls() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    let app = app_root(&mut client).await;

    let result = timeout(Duration::from_secs(10), async {
        for n in 0..200i64 {
            let reply = client.call(app, "add_one", vec![json!(n)]).await.unwrap();
            assert_eq!(reply.payload, json!(n + 1));
        }
    })
    .await;
    assert!(result.is_ok(), "calls did not complete in time");

    server.shutdown().await;
}

#[tokio::test]
async fn test_large_result_list_registers_every_object() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    let root = client.root_id().unwrap();
    let app = app_root(&mut client).await;

    let reply = client.call(app, "nodes", vec![json!(500)]).await.unwrap();
    assert_eq!(reply.payload.as_array().unwrap().len(), 500);

    let count = client.call(root, "object_count", vec![]).await.unwrap();
    assert_eq!(count.payload, json!(502));

    server.shutdown().await;
}
