//! Protocol message types for client/server communication.

use std::fmt;

use objlink_core::{is_reference, ObjectId, META_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ProtocolError;

/// Metadata key for the correlation id.
pub const ID_KEY: &str = "id";

/// Metadata key for the message type code.
pub const TYPE_KEY: &str = "type";

/// Metadata key for the call outcome.
pub const STATUS_KEY: &str = "status";

/// Field carrying payloads that are not object references.
pub const VALUE_KEY: &str = "value";

// ============================================================================
// Message Kind
// ============================================================================

/// Server message type codes.
///
/// Codes are fixed on the wire and shared with existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MessageKind {
    /// Outcome of a call
    CallResult = 0,
    /// Call received, dispatch starting
    CallAck = 1,
    /// Reserved; never emitted by the server
    Notification = 2,
    /// Sent once per connection, describes the server root object
    Control = 3,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::CallResult),
            1 => Ok(Self::CallAck),
            2 => Ok(Self::Notification),
            3 => Ok(Self::Control),
            other => Err(ProtocolError::UnknownKind(u64::from(other))),
        }
    }
}

/// Outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Correlation Id
// ============================================================================

/// Client-assigned correlation token, echoed in the ack and the result.
///
/// Clients may use numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(JsonValue);

impl CallId {
    /// Wraps a raw JSON token if it is a number or a string.
    pub fn from_json(token: JsonValue) -> Option<Self> {
        match token {
            JsonValue::Number(_) | JsonValue::String(_) => Some(Self(token)),
            _ => None,
        }
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.as_u64()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            JsonValue::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<u64> for CallId {
    fn from(n: u64) -> Self {
        Self(JsonValue::from(n))
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(JsonValue::from(s))
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(JsonValue::from(s))
    }
}

// ============================================================================
// Client Messages
// ============================================================================

/// A remote method call sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    /// Target object
    pub that: ObjectId,

    /// Method name
    pub name: String,

    /// Positional arguments; reference markers are resolved by the server
    #[serde(default)]
    pub args: Vec<JsonValue>,

    /// Correlation token
    pub id: CallId,
}

impl CallMessage {
    /// Creates a call message.
    pub fn new(
        that: ObjectId,
        name: impl Into<String>,
        args: Vec<JsonValue>,
        id: impl Into<CallId>,
    ) -> Self {
        Self {
            that,
            name: name.into(),
            args,
            id: id.into(),
        }
    }

    /// Encodes the call as a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::json)
    }
}

// ============================================================================
// Server Messages
// ============================================================================

/// Messages sent from server to client.
///
/// On the wire every variant is a JSON mapping with a `$meta` entry. When
/// the payload is an object reference node the message keys are merged into
/// its own `$meta`; any other payload is carried under `value`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Root object descriptor, sent once on connect
    Control { root: JsonValue },

    /// Call received
    Ack { id: CallId },

    /// Call finished
    Result {
        id: CallId,
        status: CallStatus,
        payload: JsonValue,
    },

    /// Reserved
    Notification { payload: JsonValue },
}

impl ServerMessage {
    /// Creates a control message around a root node.
    pub fn control(root: JsonValue) -> Self {
        Self::Control { root }
    }

    /// Creates an acknowledgment.
    pub fn ack(id: CallId) -> Self {
        Self::Ack { id }
    }

    /// Creates a success result.
    pub fn success(id: CallId, payload: JsonValue) -> Self {
        Self::Result {
            id,
            status: CallStatus::Success,
            payload,
        }
    }

    /// Creates an error result carrying a description.
    pub fn error(id: CallId, message: &str) -> Self {
        Self::Result {
            id,
            status: CallStatus::Error,
            payload: JsonValue::from(message),
        }
    }

    /// Returns the message type code.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Control { .. } => MessageKind::Control,
            Self::Ack { .. } => MessageKind::CallAck,
            Self::Result { .. } => MessageKind::CallResult,
            Self::Notification { .. } => MessageKind::Notification,
        }
    }

    /// Returns the correlation id, for acks and results.
    pub fn id(&self) -> Option<&CallId> {
        match self {
            Self::Ack { id } | Self::Result { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Builds the wire form.
    pub fn to_json(&self) -> JsonValue {
        let mut meta = Map::new();
        meta.insert(TYPE_KEY.to_string(), JsonValue::from(u8::from(self.kind())));

        match self {
            Self::Control { root } => with_meta(root.clone(), meta),
            Self::Ack { id } => {
                meta.insert(ID_KEY.to_string(), id.as_json().clone());
                let mut node = Map::new();
                node.insert(META_KEY.to_string(), JsonValue::Object(meta));
                JsonValue::Object(node)
            }
            Self::Result {
                id,
                status,
                payload,
            } => {
                meta.insert(ID_KEY.to_string(), id.as_json().clone());
                meta.insert(STATUS_KEY.to_string(), JsonValue::from(status.as_str()));
                with_meta(payload.clone(), meta)
            }
            Self::Notification { payload } => with_meta(payload.clone(), meta),
        }
    }

    /// Encodes the message as a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(&self.to_json()).map_err(ProtocolError::json)
    }

    /// Decodes a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let node: JsonValue = serde_json::from_str(text).map_err(ProtocolError::json)?;
        Self::from_json(node)
    }

    /// Decodes the wire form.
    pub fn from_json(node: JsonValue) -> Result<Self, ProtocolError> {
        let JsonValue::Object(mut fields) = node else {
            return Err(ProtocolError::MissingMeta);
        };
        let Some(JsonValue::Object(mut meta)) = fields.remove(META_KEY) else {
            return Err(ProtocolError::MissingMeta);
        };

        let code = meta
            .remove(TYPE_KEY)
            .ok_or(ProtocolError::MissingField(TYPE_KEY))?;
        let code = code.as_u64().ok_or_else(|| ProtocolError::InvalidField {
            field: TYPE_KEY,
            reason: format!("expected integer, got {code}"),
        })?;
        let kind = u8::try_from(code)
            .map_err(|_| ProtocolError::UnknownKind(code))
            .and_then(MessageKind::try_from)?;

        let id = meta.remove(ID_KEY).and_then(CallId::from_json);
        let status = meta
            .remove(STATUS_KEY)
            .map(serde_json::from_value::<CallStatus>)
            .transpose()
            .map_err(|e| ProtocolError::InvalidField {
                field: STATUS_KEY,
                reason: e.to_string(),
            })?;

        // Whatever metadata is left belongs to the payload node
        let payload = if meta.is_empty() {
            fields.remove(VALUE_KEY).unwrap_or(JsonValue::Null)
        } else {
            fields.insert(META_KEY.to_string(), JsonValue::Object(meta));
            JsonValue::Object(fields)
        };

        match kind {
            MessageKind::Control => Ok(Self::Control { root: payload }),
            MessageKind::CallAck => Ok(Self::Ack {
                id: id.ok_or(ProtocolError::MissingField(ID_KEY))?,
            }),
            MessageKind::CallResult => Ok(Self::Result {
                id: id.ok_or(ProtocolError::MissingField(ID_KEY))?,
                status: status.ok_or(ProtocolError::MissingField(STATUS_KEY))?,
                payload,
            }),
            MessageKind::Notification => Ok(Self::Notification { payload }),
        }
    }
}

/// Attaches message metadata to a payload node.
fn with_meta(payload: JsonValue, meta: Map<String, JsonValue>) -> JsonValue {
    if is_reference(&payload) {
        if let JsonValue::Object(mut fields) = payload {
            if let Some(JsonValue::Object(existing)) = fields.get_mut(META_KEY) {
                existing.extend(meta);
            }
            return JsonValue::Object(fields);
        }
    }

    let mut node = Map::new();
    node.insert(VALUE_KEY.to_string(), payload);
    node.insert(META_KEY.to_string(), JsonValue::Object(meta));
    JsonValue::Object(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn marker(that: u64) -> JsonValue {
        json!({"$meta": {"that": that, "class": "Server", "methods": ["get_root"]}})
    }

    #[test]
    fn test_ack_wire_format() {
        let msg = ServerMessage::ack(CallId::from(7));
        assert_eq!(msg.to_json(), json!({"$meta": {"id": 7, "type": 1}}));
    }

    #[test]
    fn test_control_merges_into_root_meta() {
        let msg = ServerMessage::control(marker(99));
        assert_eq!(
            msg.to_json(),
            json!({"$meta": {"that": 99, "class": "Server", "methods": ["get_root"], "type": 3}})
        );
    }

    #[test]
    fn test_primitive_result_wraps_value() {
        let msg = ServerMessage::success(CallId::from("call-1"), json!(42));
        assert_eq!(
            msg.to_json(),
            json!({"value": 42, "$meta": {"id": "call-1", "type": 0, "status": "success"}})
        );
    }

    #[test]
    fn test_plain_map_result_is_wrapped() {
        let msg = ServerMessage::success(CallId::from(3), json!({"target": 4, "current": 25}));
        let wire = msg.to_json();
        assert_eq!(wire["value"], json!({"target": 4, "current": 25}));
        assert_eq!(wire["$meta"]["status"], "success");
    }

    #[test]
    fn test_error_result_format() {
        let msg = ServerMessage::error(CallId::from(5), "Object with id 12 not found");
        assert_eq!(
            msg.to_json(),
            json!({
                "value": "Object with id 12 not found",
                "$meta": {"id": 5, "type": 0, "status": "error"}
            })
        );
    }

    #[test]
    fn test_object_result_parses_back_with_marker() {
        let mut payload = marker(1234);
        payload["name"] = json!("plate");
        let msg = ServerMessage::success(CallId::from(9), payload.clone());

        let parsed = ServerMessage::parse(&msg.to_text().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_parse_control_and_results() {
        let control = ServerMessage::parse(
            r#"{"$meta": {"that": 99, "class": "Server", "methods": [], "type": 3}}"#,
        )
        .unwrap();
        match control {
            ServerMessage::Control { root } => assert_eq!(root["$meta"]["that"], 99),
            other => panic!("Expected Control, got {other:?}"),
        }

        let result =
            ServerMessage::parse(r#"{"value": 42, "$meta": {"id": 1, "type": 0, "status": "success"}}"#)
                .unwrap();
        assert_eq!(result, ServerMessage::success(CallId::from(1), json!(42)));
    }

    #[test]
    fn test_parse_rejects_bad_messages() {
        assert_eq!(
            ServerMessage::parse(r#"{"value": 1}"#),
            Err(ProtocolError::MissingMeta)
        );
        assert_eq!(
            ServerMessage::parse(r#"{"$meta": {"type": 9}}"#),
            Err(ProtocolError::UnknownKind(9))
        );
        assert_eq!(
            ServerMessage::parse(r#"{"$meta": {"type": 1}}"#),
            Err(ProtocolError::MissingField(ID_KEY))
        );
        assert!(matches!(
            ServerMessage::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_message_kind_codes() {
        assert_eq!(serde_json::to_string(&MessageKind::CallResult).unwrap(), "0");
        assert_eq!(serde_json::to_string(&MessageKind::Control).unwrap(), "3");
        let kind: MessageKind = serde_json::from_str("2").unwrap();
        assert_eq!(kind, MessageKind::Notification);
        assert!(serde_json::from_str::<MessageKind>("4").is_err());
    }

    #[test]
    fn test_call_message_serialization() {
        let call = CallMessage::new(ObjectId::new(77), "increment", vec![json!(41)], 1);
        let json = call.to_text().unwrap();
        assert!(json.contains("\"that\":77"));
        assert!(json.contains("\"name\":\"increment\""));
        assert!(json.contains("\"args\":[41]"));
        assert!(json.contains("\"id\":1"));
    }

    #[test]
    fn test_call_id_display() {
        assert_eq!(CallId::from(12).to_string(), "12");
        assert_eq!(CallId::from("abc").to_string(), "abc");
        assert!(CallId::from_json(json!(null)).is_none());
        assert!(CallId::from_json(json!([1])).is_none());
    }
}
