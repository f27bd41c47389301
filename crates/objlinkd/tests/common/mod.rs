//! Shared helpers for objlinkd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use objlink_client::ObjectClient;
use objlink_core::{Args, InvokeError, InvokeResult, ObjectId, ObjectRef, RemoteObject, Value};
use objlinkd::registry::RegistryHandle;
use objlinkd::{ObjectServer, RegistryScope, ServerConfig};
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Grace period for server shutdown
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Objects
// ============================================================================

/// Linked node used to build cycles.
pub struct Node {
    pub name: String,
    pub next: Mutex<Option<ObjectRef>>,
}

impl Node {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            next: Mutex::new(None),
        })
    }

    pub fn link(&self, next: ObjectRef) {
        *self.next.lock().unwrap() = Some(next);
    }

    fn next_value(&self) -> Value {
        Value::from(self.next.lock().unwrap().clone())
    }
}

#[async_trait]
impl RemoteObject for Node {
    fn class_name(&self) -> &'static str {
        "Node"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["get_name", "get_next"]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from(self.name.as_str())),
            ("next", self.next_value()),
        ]
    }

    async fn invoke(&self, method: &str, _args: Vec<Value>) -> InvokeResult<Value> {
        match method {
            "get_name" => Ok(Value::from(self.name.as_str())),
            "get_next" => Ok(self.next_value()),
            _ => Err(InvokeError::unknown("Node", method)),
        }
    }
}

/// Application root for protocol tests.
pub struct TestApp {
    child: Arc<Node>,
}

impl TestApp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            child: Node::new("child"),
        })
    }
}

#[async_trait]
impl RemoteObject for TestApp {
    fn class_name(&self) -> &'static str {
        "TestApp"
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "add_one", "echo", "fail", "sleep_ms", "get_child", "new_node", "ring", "nodes",
        ]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![("label", Value::from("test app"))]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "add_one" => {
                args.expect_len(1)?;
                Ok(Value::from(args.i64(0)? + 1))
            }
            "echo" => {
                args.expect_len(1)?;
                Ok(args.value(0)?.clone())
            }
            "fail" => Err(InvokeError::failed("deliberate failure")),
            "sleep_ms" => {
                args.expect_len(1)?;
                let ms = args.i64(0)?;
                sleep(Duration::from_millis(ms.max(0) as u64)).await;
                Ok(Value::from(ms))
            }
            "get_child" => {
                let child: ObjectRef = self.child.clone();
                Ok(Value::Object(child))
            }
            "new_node" => Ok(Value::object(Node::new("fresh"))),
            "ring" => {
                let a = Node::new("a");
                let b = Node::new("b");
                a.link(b.clone());
                b.link(a.clone());
                Ok(Value::object(a))
            }
            "nodes" => {
                args.expect_len(1)?;
                let count = args.i64(0)?.max(0) as usize;
                let nodes: Vec<Value> = (0..count)
                    .map(|i| Value::object(Node::new(&format!("n{i}"))))
                    .collect();
                Ok(Value::List(nodes))
            }
            _ => Err(InvokeError::unknown("TestApp", method)),
        }
    }
}

// ============================================================================
// Test Server
// ============================================================================

pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..ServerConfig::default()
    }
}

pub fn shared_config() -> ServerConfig {
    ServerConfig {
        registry_scope: RegistryScope::Shared,
        ..test_config()
    }
}

/// Running server bound to an ephemeral port.
pub struct TestServer {
    pub url: String,
    pub shared_registry: Option<RegistryHandle>,
    cancel_token: CancellationToken,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(), TestApp::new()).await
    }

    pub async fn spawn_with_config(config: ServerConfig) -> Self {
        Self::spawn_with(config, TestApp::new()).await
    }

    pub async fn spawn_with(config: ServerConfig, app: ObjectRef) -> Self {
        let cancel_token = CancellationToken::new();
        let server = ObjectServer::bind(config, Some(app), cancel_token.clone())
            .await
            .expect("bind server");
        let url = server.url().expect("server url");
        let shared_registry = server.shared_registry().cloned();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            url,
            shared_registry,
            cancel_token,
        }
    }

    pub async fn connect(&self) -> ObjectClient {
        ObjectClient::connect(&self.url)
            .await
            .expect("connect to server")
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

// ============================================================================
// Client Helpers
// ============================================================================

/// Reference marker for an id, as a call argument.
pub fn marker(id: ObjectId) -> JsonValue {
    json!({"$meta": {"that": id.get()}})
}

/// `that` of a reference node.
pub fn that_of(node: &JsonValue) -> ObjectId {
    objlink_core::marker_id(node).expect("payload is a reference")
}

/// Connects and fetches the application root id.
pub async fn app_root(client: &mut ObjectClient) -> ObjectId {
    let server = client.root_id().unwrap();
    let reply = client.call(server, "get_root", vec![]).await.unwrap();
    assert!(reply.is_success(), "get_root failed: {:?}", reply.payload);
    that_of(&reply.payload)
}
