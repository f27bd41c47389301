//! Per-client WebSocket session.
//!
//! A session sends one control message carrying the server root reference,
//! then answers every call frame with an acknowledgement followed by a
//! result. Calls from one client are handled in arrival order.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Dispatch and serialization failures become error results, never
//!   session failures
//! - Only transport failures end a session

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use objlink_core::{serialize, ObjectId, ObjectRef, SerializeOptions, Value};
use objlink_protocol::{parse_call, CallId, CallMessage, MalformedCall, ServerMessage};
use serde_json::Value as JsonValue;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::registry::RegistryHandle;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Consecutive recoverable transport errors tolerated before giving up
const MAX_TRANSPORT_ERRORS: u32 = 16;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, control message not yet sent
    Connecting,
    /// Processing calls
    Open,
    Closed,
}

/// Handles one client connection.
pub struct SessionHandler<S> {
    ws: S,
    root: ObjectRef,
    dispatcher: Dispatcher,
    config: Arc<ServerConfig>,
    cancel_token: CancellationToken,
    session_id: u64,
    state: SessionState,
    calls_handled: u64,
}

impl<S> SessionHandler<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send,
{
    pub fn new(
        ws: S,
        root: ObjectRef,
        registry: RegistryHandle,
        config: Arc<ServerConfig>,
        cancel_token: CancellationToken,
        session_id: u64,
    ) -> Self {
        Self {
            ws,
            root,
            dispatcher: Dispatcher::new(registry),
            config,
            cancel_token,
            session_id,
            state: SessionState::Connecting,
            calls_handled: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until the client disconnects or the server shuts
    /// down. Returns the number of calls answered.
    pub async fn run(mut self) -> u64 {
        debug!(session = self.session_id, "Session connecting");

        if let Err(e) = self.send_control().await {
            warn!(
                session = self.session_id,
                error = %e,
                "Failed to send control message"
            );
            self.state = SessionState::Closed;
            return 0;
        }
        self.state = SessionState::Open;
        info!(session = self.session_id, "Session open");

        if let Err(e) = self.process_messages().await {
            debug!(
                session = self.session_id,
                error = %e,
                "Session transport closed"
            );
        }

        self.state = SessionState::Closed;
        info!(
            session = self.session_id,
            calls = self.calls_handled,
            "Session closed"
        );
        self.calls_handled
    }

    /// Sends the shallow reference to the server root.
    async fn send_control(&mut self) -> Result<(), SessionError> {
        let out = serialize(&Value::Object(self.root.clone()), SerializeOptions::shallow());
        if let Err(e) = self.dispatcher.registry().merge(out.refs).await {
            warn!(session = self.session_id, error = %e, "Failed to register server root");
        }
        self.send(ServerMessage::control(out.node)).await
    }

    /// Reads frames until the connection closes or an unrecoverable error
    /// occurs.
    async fn process_messages(&mut self) -> Result<(), SessionError> {
        let mut transport_errors = 0u32;

        loop {
            let frame = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(session = self.session_id, "Server shutting down, closing session");
                    let _ = timeout(WRITE_TIMEOUT, self.ws.send(Message::Close(None))).await;
                    return Ok(());
                }
                frame = self.ws.next() => frame,
            };

            let Some(frame) = frame else {
                debug!(session = self.session_id, "Client disconnected");
                return Ok(());
            };

            match frame {
                Ok(Message::Text(text)) => {
                    transport_errors = 0;
                    self.handle_text(text.as_str()).await?;
                }
                Ok(Message::Binary(data)) => {
                    transport_errors = 0;
                    warn!(
                        session = self.session_id,
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Ok(Message::Close(close)) => {
                    debug!(session = self.session_id, ?close, "Client sent close");
                    return Ok(());
                }
                // Ping/pong are answered by tungstenite
                Ok(_) => {}
                Err(e) if is_fatal(&e) => return Err(SessionError::Transport(e.to_string())),
                Err(e) => {
                    transport_errors += 1;
                    warn!(session = self.session_id, error = %e, "Transport error");
                    if transport_errors >= MAX_TRANSPORT_ERRORS {
                        return Err(SessionError::Transport(e.to_string()));
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        let max = self.config.max_message_bytes;
        let parsed = if text.len() > max {
            Err(MalformedCall::oversized(text, max))
        } else {
            parse_call(text)
        };

        match parsed {
            Ok(call) => self.handle_call(call).await,
            Err(malformed) => self.reject(malformed).await,
        }
    }

    /// Answers a malformed frame with an ack and an error result.
    async fn reject(&mut self, malformed: MalformedCall) -> Result<(), SessionError> {
        warn!(
            session = self.session_id,
            id = ?malformed.id,
            reason = %malformed.reason,
            "Malformed call"
        );
        let reason = malformed.to_string();
        // Without an id there is nobody to answer
        if let Some(id) = malformed.id {
            self.send(ServerMessage::ack(id.clone())).await?;
            self.send(ServerMessage::error(id, &reason)).await?;
        }
        Ok(())
    }

    /// Acknowledges, dispatches, and answers one call.
    async fn handle_call(&mut self, call: CallMessage) -> Result<(), SessionError> {
        let CallMessage {
            that,
            name,
            args,
            id,
        } = call;

        self.send(ServerMessage::ack(id.clone())).await?;
        trace!(session = self.session_id, %id, "Ack sent");

        let message = match self.dispatch(that, &name, args).await {
            Ok(value) => self.success(id, value).await,
            Err(e) => {
                error!(
                    session = self.session_id,
                    %that,
                    method = %name,
                    error = %e,
                    "Call failed"
                );
                ServerMessage::error(id, &e.to_string())
            }
        };

        self.send(message).await?;
        self.calls_handled += 1;
        Ok(())
    }

    async fn dispatch(
        &self,
        that: ObjectId,
        name: &str,
        args: Vec<JsonValue>,
    ) -> Result<Value, DispatchError> {
        let call = self.dispatcher.dispatch(that, name, args);
        match self.config.call_timeout() {
            Some(limit) => timeout(limit, call)
                .await
                .unwrap_or(Err(DispatchError::Timeout(limit))),
            None => call.await,
        }
    }

    /// Serializes a return value and registers every object it exposes.
    async fn success(&self, id: CallId, value: Value) -> ServerMessage {
        let out = serialize(&value, self.config.serialize_options());
        match self.dispatcher.registry().merge(out.refs).await {
            Ok(added) => {
                trace!(session = self.session_id, added, "Merged references");
                ServerMessage::success(id, out.node)
            }
            Err(e) => {
                error!(session = self.session_id, error = %e, "Failed to register result");
                ServerMessage::error(id, &e.to_string())
            }
        }
    }

    async fn send(&mut self, msg: ServerMessage) -> Result<(), SessionError> {
        let text = msg
            .to_text()
            .map_err(|e| SessionError::Encode(e.to_string()))?;

        match timeout(WRITE_TIMEOUT, self.ws.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Encode error: {0}")]
    Encode(String),
}

/// Errors after which the socket is unusable.
fn is_fatal(err: &WsError) -> bool {
    matches!(
        err,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::WriteTimeout.to_string(), "Write timeout");
        assert_eq!(
            SessionError::Transport("reset".into()).to_string(),
            "Transport error: reset"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(is_fatal(&WsError::ConnectionClosed));
        assert!(is_fatal(&WsError::AlreadyClosed));
        assert!(is_fatal(&WsError::Io(std::io::Error::other("gone"))));
        assert!(!is_fatal(&WsError::Capacity(
            tokio_tungstenite::tungstenite::error::CapacityError::MessageTooLong {
                size: 10,
                max_size: 5,
            }
        )));
        assert!(!is_fatal(&WsError::Protocol(
            ProtocolError::InvalidOpcode(9)
        )));
    }
}
