//! WebSocket client for an objlink server.
//!
//! The `ObjectClient` handles:
//! - Connecting and reading the control message
//! - Issuing calls and pairing acknowledgements and results by id
//! - Raw frame access for callers that pipeline or probe the server
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use objlink_core::{marker_id, ObjectId};
use objlink_protocol::{CallId, CallMessage, CallStatus, ServerMessage};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

/// Default wait for any single server message.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Call Reply
// ============================================================================

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallReply {
    pub id: CallId,
    pub status: CallStatus,

    /// Return value node, or the error text for failed calls
    pub payload: JsonValue,
}

impl CallReply {
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }

    /// Identifier of the returned object, if the payload is a reference.
    pub fn that(&self) -> Option<ObjectId> {
        marker_id(&self.payload)
    }

    /// Error text for failed calls.
    pub fn error_message(&self) -> Option<&str> {
        match self.status {
            CallStatus::Error => self.payload.as_str(),
            CallStatus::Success => None,
        }
    }

    /// Converts an error status into [`ClientError::Remote`].
    pub fn into_result(self) -> Result<JsonValue> {
        match self.status {
            CallStatus::Success => Ok(self.payload),
            CallStatus::Error => Err(ClientError::Remote(
                self.payload
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.payload.to_string()),
            )),
        }
    }
}

// ============================================================================
// Object Client
// ============================================================================

/// Connection to an objlink server.
///
/// # Example
///
/// ```rust,ignore
/// let mut client = ObjectClient::connect("ws://127.0.0.1:31950").await?;
/// let server = client.root_id()?;
/// let app = client.call(server, "get_root", vec![]).await?;
/// ```
pub struct ObjectClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    root: JsonValue,
    next_id: u64,
    timeout: Duration,
}

impl ObjectClient {
    /// Connects and waits for the control message.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, wait: Duration) -> Result<Self> {
        let connect = connect_async(url);
        let (ws, _response) = timeout(wait, connect)
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| ClientError::Connect {
                url: url.to_string(),
                error: e.to_string(),
            })?;
        debug!(url, "Connected");

        let mut client = Self {
            ws,
            root: JsonValue::Null,
            next_id: 1,
            timeout: wait,
        };

        match client.recv().await? {
            ServerMessage::Control { root } => {
                client.root = root;
                Ok(client)
            }
            other => Err(ClientError::UnexpectedMessage(format!(
                "expected control message, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Server root node from the control message.
    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    /// Identifier of the server root object.
    pub fn root_id(&self) -> Result<ObjectId> {
        marker_id(&self.root).ok_or_else(|| ClientError::NotAReference(self.root.to_string()))
    }

    /// Allocates the next call id.
    pub fn next_id(&mut self) -> CallId {
        let id = CallId::from(self.next_id);
        self.next_id += 1;
        id
    }

    /// Calls `name` on `that` and waits for its acknowledgement and result.
    ///
    /// An error status is returned as a reply, not as `Err`; use
    /// [`CallReply::into_result`] to convert.
    pub async fn call(
        &mut self,
        that: ObjectId,
        name: &str,
        args: Vec<JsonValue>,
    ) -> Result<CallReply> {
        let id = self.next_id();
        self.send_call(&CallMessage::new(that, name, args, id.clone()))
            .await?;
        self.await_reply(&id).await
    }

    /// Waits for the ack and then the result of call `id`.
    ///
    /// Messages for other ids are skipped.
    pub async fn await_reply(&mut self, id: &CallId) -> Result<CallReply> {
        let mut acked = false;
        loop {
            match self.recv().await? {
                ServerMessage::Ack { id: got } if &got == id => {
                    trace!(%id, "Ack received");
                    acked = true;
                }
                ServerMessage::Result {
                    id: got,
                    status,
                    payload,
                } if &got == id => {
                    if !acked {
                        return Err(ClientError::UnexpectedMessage(format!(
                            "result for call {id} arrived before its ack"
                        )));
                    }
                    return Ok(CallReply {
                        id: got,
                        status,
                        payload,
                    });
                }
                other => {
                    debug!(kind = ?other.kind(), "Skipping unrelated message");
                }
            }
        }
    }

    pub async fn send_call(&mut self, call: &CallMessage) -> Result<()> {
        let text = call.to_text()?;
        self.send_text(text).await
    }

    /// Sends a raw text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.ws
            .send(Message::Text(text.into().into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Sends a raw binary frame.
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.ws
            .send(Message::Binary(data.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Reads the next server message.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        loop {
            let frame = timeout(self.timeout, self.ws.next())
                .await
                .map_err(|_| ClientError::Timeout)?;

            match frame {
                None | Some(Ok(Message::Close(_))) => return Err(ClientError::Closed),
                Some(Ok(Message::Text(text))) => return Ok(ServerMessage::parse(text.as_str())?),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
            }
        }
    }

    /// Sends a close frame.
    pub async fn close(mut self) -> Result<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_helpers() {
        let ok = CallReply {
            id: CallId::from(1),
            status: CallStatus::Success,
            payload: json!({"$meta": {"that": 99, "class": "Well", "methods": []}}),
        };
        assert!(ok.is_success());
        assert_eq!(ok.that(), Some(ObjectId::new(99)));
        assert!(ok.error_message().is_none());

        let err = CallReply {
            id: CallId::from(2),
            status: CallStatus::Error,
            payload: json!("Object with id 5 not found"),
        };
        assert_eq!(err.error_message(), Some("Object with id 5 not found"));
        assert!(matches!(err.into_result(), Err(ClientError::Remote(m)) if m.contains("id 5")));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is privileged and not listening in test environments
        let result =
            ObjectClient::connect_with_timeout("ws://127.0.0.1:1", Duration::from_secs(2)).await;
        assert!(matches!(
            result,
            Err(ClientError::Connect { .. }) | Err(ClientError::Timeout)
        ));
    }
}
