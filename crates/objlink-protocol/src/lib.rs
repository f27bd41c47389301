//! objlink Protocol - Wire protocol for object-graph RPC
//!
//! This crate provides the message types exchanged over a connection:
//! calls from the client, and control, acknowledgment and result messages
//! from the server. Every server message carries a `$meta` mapping holding
//! its type code and, where relevant, the correlation id and call status.

pub mod error;
pub mod message;
pub mod parse;

pub use error::ProtocolError;
pub use message::{
    CallId, CallMessage, CallStatus, MessageKind, ServerMessage, ID_KEY, STATUS_KEY, TYPE_KEY,
    VALUE_KEY,
};
pub use parse::{parse_call, MalformedCall};
