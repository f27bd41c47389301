//! Inbound call parsing.
//!
//! A frame that fails to parse as a call may still carry a usable
//! correlation id. `MalformedCall` keeps it so the server can answer with
//! an error result instead of dropping the call silently.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::message::{CallId, CallMessage, ID_KEY};

/// A text frame that is not a valid call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed call message: {reason}")]
pub struct MalformedCall {
    /// Correlation id recovered from the frame, if any
    pub id: Option<CallId>,

    /// Why parsing failed
    pub reason: String,
}

impl MalformedCall {
    fn new(id: Option<CallId>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }

    /// Rejects a frame longer than `max_bytes`.
    ///
    /// The id is still recovered when the frame is a JSON object carrying
    /// one, so the caller gets an answer instead of waiting forever.
    pub fn oversized(text: &str, max_bytes: usize) -> Self {
        Self::new(
            recover_id(text),
            format!("message of {} bytes exceeds limit of {max_bytes} bytes", text.len()),
        )
    }
}

fn recover_id(text: &str) -> Option<CallId> {
    let node: JsonValue = serde_json::from_str(text).ok()?;
    node.get(ID_KEY).cloned().and_then(CallId::from_json)
}

/// Parses a text frame as a call message.
pub fn parse_call(text: &str) -> Result<CallMessage, MalformedCall> {
    let node: JsonValue =
        serde_json::from_str(text).map_err(|e| MalformedCall::new(None, e.to_string()))?;

    let id = node.get(ID_KEY).cloned().and_then(CallId::from_json);
    if id.is_none() {
        return Err(MalformedCall::new(None, "missing or invalid id"));
    }

    serde_json::from_value::<CallMessage>(node).map_err(|e| MalformedCall::new(id, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use objlink_core::ObjectId;
    use serde_json::json;

    #[test]
    fn test_parse_valid_call() {
        let call =
            parse_call(r#"{"that": 140234112, "name": "get_root", "args": [], "id": 1}"#).unwrap();
        assert_eq!(call.that, ObjectId::new(140_234_112));
        assert_eq!(call.name, "get_root");
        assert!(call.args.is_empty());
        assert_eq!(call.id, CallId::from(1));
    }

    #[test]
    fn test_args_default_to_empty() {
        let call = parse_call(r#"{"that": 5, "name": "ping", "id": "a"}"#).unwrap();
        assert!(call.args.is_empty());
        assert_eq!(call.id, CallId::from("a"));
    }

    #[test]
    fn test_marker_args_are_kept_verbatim() {
        let call = parse_call(
            r#"{"that": 5, "name": "transfer", "args": [{"$meta": {"that": 6}}, 20.5], "id": 2}"#,
        )
        .unwrap();
        assert_eq!(call.args[0], json!({"$meta": {"that": 6}}));
        assert_eq!(call.args[1], json!(20.5));
    }

    #[test]
    fn test_invalid_json_has_no_id() {
        let err = parse_call("{not json").unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn test_missing_field_keeps_id() {
        let err = parse_call(r#"{"name": "get_root", "id": 17}"#).unwrap_err();
        assert_eq!(err.id, Some(CallId::from(17)));
        assert!(err.reason.contains("that"));
        assert!(err.to_string().starts_with("malformed call message"));
    }

    #[test]
    fn test_missing_id_is_unrecoverable() {
        let err = parse_call(r#"{"that": 5, "name": "ping", "args": []}"#).unwrap_err();
        assert!(err.id.is_none());

        let err = parse_call(r#"{"that": 5, "name": "ping", "id": null}"#).unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn test_non_integer_that_is_malformed() {
        let err = parse_call(r#"{"that": "abc", "name": "ping", "id": 3}"#).unwrap_err();
        assert_eq!(err.id, Some(CallId::from(3)));
    }

    #[test]
    fn test_oversized_keeps_recoverable_id() {
        let big = "x".repeat(64);
        let text = format!(r#"{{"that": 5, "name": "echo", "args": ["{big}"], "id": "big"}}"#);
        let err = MalformedCall::oversized(&text, 32);
        assert_eq!(err.id, Some(CallId::from("big")));
        assert_eq!(
            err.reason,
            format!("message of {} bytes exceeds limit of 32 bytes", text.len())
        );
    }

    #[test]
    fn test_oversized_without_id() {
        assert!(MalformedCall::oversized("{truncated", 4).id.is_none());
        assert!(MalformedCall::oversized(r#"{"that": 5}"#, 4).id.is_none());
    }
}
