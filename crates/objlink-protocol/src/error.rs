//! Protocol-level errors.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("message has no $meta mapping")]
    MissingMeta,

    #[error("unknown message type: {0}")]
    UnknownKind(u64),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ProtocolError {
    /// Creates a JSON error from any error type.
    pub fn json<E: std::fmt::Display>(err: E) -> Self {
        Self::Json(err.to_string())
    }
}
