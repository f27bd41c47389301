//! Client error types.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` in this crate outside tests.

use objlink_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by [`ObjectClient`](crate::ObjectClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket handshake or TCP connect failed.
    #[error("Failed to connect to {url}: {error}")]
    Connect { url: String, error: String },

    /// The socket failed after connecting.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server sent something that is not a valid message.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A valid message arrived where another was expected.
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// No message within the configured timeout.
    #[error("Timed out waiting for server")]
    Timeout,

    #[error("Connection closed by server")]
    Closed,

    /// The call completed with status `error`; carries the server's text.
    #[error("Remote call failed: {0}")]
    Remote(String),

    /// A node expected to be an object reference is not one.
    #[error("Not an object reference: {0}")]
    NotAReference(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
