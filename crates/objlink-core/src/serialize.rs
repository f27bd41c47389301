//! Graph serializer: live values to wire nodes.
//!
//! Primitives, lists and maps map onto their JSON counterparts. Objects
//! become reference markers:
//!
//! ```text
//! {"$meta": {"that": 140234112, "class": "Labware", "methods": [...]}, "name": ..}
//! ```
//!
//! In depth mode an object's `attributes()` are walked and emitted as
//! sibling fields of `$meta`. Each object is expanded at most once per call;
//! later occurrences (including cycles) are emitted as bare markers.
//!
//! Every object encountered is reported in `Serialized::refs` so the caller
//! can merge it into its registry.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::trace;

use crate::object::{ObjectId, ObjectRef, RemoteObject};
use crate::value::Value;

/// Key holding metadata on marker nodes and wire messages.
pub const META_KEY: &str = "$meta";

/// Metadata key carrying the object identifier.
pub const THAT_KEY: &str = "that";

/// Metadata key carrying the object's type name.
pub const CLASS_KEY: &str = "class";

/// Metadata key listing the object's invokable operations.
pub const METHODS_KEY: &str = "methods";

/// Object nesting limit for depth serialization.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Controls how far the serializer expands objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Emit markers only, never fields.
    pub shallow: bool,

    /// Objects nested deeper than this are emitted as markers.
    pub max_depth: usize,
}

impl SerializeOptions {
    pub const fn shallow() -> Self {
        Self {
            shallow: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub const fn deep() -> Self {
        Self {
            shallow: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self::deep()
    }
}

/// Output of one serializer pass.
pub struct Serialized {
    /// Root wire node.
    pub node: JsonValue,

    /// Objects discovered during the pass, each listed once.
    pub refs: Vec<(ObjectId, ObjectRef)>,
}

impl Serialized {
    /// Identifiers of the discovered objects, in discovery order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.refs.iter().map(|(id, _)| *id).collect()
    }
}

/// Serializes a value graph.
pub fn serialize(value: &Value, options: SerializeOptions) -> Serialized {
    let mut walker = GraphWalker::new(options);
    let node = walker.walk(value, 0);
    Serialized {
        node,
        refs: walker.refs,
    }
}

/// Builds the bare reference marker for an object.
pub fn reference_marker(id: ObjectId, object: &dyn RemoteObject) -> JsonValue {
    let mut meta = Map::new();
    meta.insert(THAT_KEY.to_string(), JsonValue::from(id.get()));
    meta.insert(
        CLASS_KEY.to_string(),
        JsonValue::from(object.class_name()),
    );
    meta.insert(
        METHODS_KEY.to_string(),
        JsonValue::Array(
            object
                .methods()
                .iter()
                .map(|m| JsonValue::from(*m))
                .collect(),
        ),
    );

    let mut node = Map::new();
    node.insert(META_KEY.to_string(), JsonValue::Object(meta));
    JsonValue::Object(node)
}

/// Returns the identifier carried by a reference marker, if `node` is one.
pub fn marker_id(node: &JsonValue) -> Option<ObjectId> {
    node.get(META_KEY)?
        .get(THAT_KEY)?
        .as_u64()
        .map(ObjectId::new)
}

/// Returns true if `node` is shaped as a reference marker.
pub fn is_reference(node: &JsonValue) -> bool {
    marker_id(node).is_some()
}

// ============================================================================
// Graph Walker
// ============================================================================

struct GraphWalker {
    options: SerializeOptions,
    /// Objects already reported in `refs`
    discovered: HashSet<ObjectId>,
    /// Objects whose fields have been emitted
    expanded: HashSet<ObjectId>,
    refs: Vec<(ObjectId, ObjectRef)>,
}

impl GraphWalker {
    fn new(options: SerializeOptions) -> Self {
        Self {
            options,
            discovered: HashSet::new(),
            expanded: HashSet::new(),
            refs: Vec::new(),
        }
    }

    fn walk(&mut self, value: &Value, depth: usize) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => {
                JsonValue::Array(items.iter().map(|item| self.walk(item, depth)).collect())
            }
            Value::Map(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), self.walk(field, depth)))
                    .collect(),
            ),
            Value::Object(obj) => self.walk_object(obj, depth),
        }
    }

    fn walk_object(&mut self, obj: &ObjectRef, depth: usize) -> JsonValue {
        let id = ObjectId::of(obj);
        if self.discovered.insert(id) {
            self.refs.push((id, Arc::clone(obj)));
        }

        let mut node = reference_marker(id, obj.as_ref());

        if self.options.shallow {
            return node;
        }
        if depth >= self.options.max_depth {
            trace!(that = %id, depth, "Depth limit reached, emitting marker only");
            return node;
        }
        if !self.expanded.insert(id) {
            return node;
        }

        if let JsonValue::Object(fields) = &mut node {
            for (name, attr) in obj.attributes() {
                // Attributes never overwrite the marker metadata
                if name == META_KEY {
                    continue;
                }
                let child = self.walk(&attr, depth + 1);
                fields.insert(name.to_string(), child);
            }
        }

        node
    }
}
