//! Remote object identity and the capability interface.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{InvokeError, InvokeResult};
use crate::value::Value;

// ============================================================================
// Object Identity
// ============================================================================

/// Opaque identifier for a live server-side object.
///
/// Issued from a process-wide counter the first time an allocation is seen,
/// never derived from the object's contents. Two handles to the same `Arc`
/// always yield the same id, and an id is never issued twice, so an id that
/// outlives its object stops resolving instead of naming a newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wraps a raw identifier received from the wire.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the identity of a live object, issuing one if needed.
    pub fn of(object: &ObjectRef) -> Self {
        IdTable::global()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id_of(object)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================================================
// Identity Table
// ============================================================================

/// Dead entries are pruned once the table reaches this many entries, or twice
/// its size after the previous prune, whichever is larger.
const MIN_PRUNE_THRESHOLD: usize = 1024;

/// Allocation address to issued id.
///
/// Each entry holds a `Weak` to its object. That keeps the allocation, though
/// not the value, from being handed to a new object while the entry exists,
/// so a hit on an address is always the same object. Once pruned, the
/// address may be reused and the newcomer gets a fresh id.
struct IdTable {
    next: u64,
    entries: HashMap<usize, (Weak<dyn RemoteObject>, ObjectId)>,
    prune_threshold: usize,
}

impl IdTable {
    fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
            prune_threshold: MIN_PRUNE_THRESHOLD,
        }
    }

    fn global() -> &'static Mutex<IdTable> {
        static TABLE: OnceLock<Mutex<IdTable>> = OnceLock::new();
        TABLE.get_or_init(|| Mutex::new(IdTable::new()))
    }

    fn id_of(&mut self, object: &ObjectRef) -> ObjectId {
        let address = Arc::as_ptr(object) as *const () as usize;
        if let Some((_, id)) = self.entries.get(&address) {
            return *id;
        }

        if self.entries.len() >= self.prune_threshold {
            self.prune();
        }

        let id = ObjectId(self.next);
        self.next += 1;
        self.entries.insert(address, (Arc::downgrade(object), id));
        id
    }

    /// Drops entries whose object is gone, releasing their allocations.
    fn prune(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        self.prune_threshold = (self.entries.len() * 2).max(MIN_PRUNE_THRESHOLD);
    }
}

// ============================================================================
// Capability Interface
// ============================================================================

/// A server-side object that remote clients may call into.
///
/// Every type exposes an explicit table of invokable operations through
/// `methods()`; the dispatcher refuses any name outside it. `attributes()`
/// is the descriptive surface walked by deep serialization.
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Type name reported in reference markers.
    fn class_name(&self) -> &'static str;

    /// Names of the remotely invokable operations.
    fn methods(&self) -> &'static [&'static str];

    /// Public fields included when the object is serialized in depth.
    fn attributes(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    /// Runs the named operation with already-resolved arguments.
    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value>;

    /// Returns true if `name` is in the capability table.
    fn has_method(&self, name: &str) -> bool {
        self.methods().iter().any(|m| *m == name)
    }

    /// Returns true if `name` is a descriptive attribute.
    fn has_attribute(&self, name: &str) -> bool {
        self.attributes().iter().any(|(attr, _)| *attr == name)
    }
}

/// Shared handle to a remote object.
pub type ObjectRef = Arc<dyn RemoteObject>;

// ============================================================================
// Argument Access
// ============================================================================

/// Positional argument accessor for `RemoteObject::invoke` bodies.
///
/// Converts shape mismatches into `InvokeError` so method bodies can use `?`.
pub struct Args<'a> {
    method: &'a str,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    pub fn new(method: &'a str, values: Vec<Value>) -> Self {
        Self { method, values }
    }

    /// Number of arguments supplied.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fails unless exactly `expected` arguments were supplied.
    pub fn expect_len(&self, expected: usize) -> InvokeResult<()> {
        if self.values.len() != expected {
            return Err(InvokeError::Arity {
                method: self.method.to_string(),
                expected,
                got: self.values.len(),
            });
        }
        Ok(())
    }

    /// Returns the argument at `index`.
    pub fn value(&self, index: usize) -> InvokeResult<&Value> {
        self.values.get(index).ok_or_else(|| InvokeError::Arity {
            method: self.method.to_string(),
            expected: index + 1,
            got: self.values.len(),
        })
    }

    pub fn f64(&self, index: usize) -> InvokeResult<f64> {
        self.value(index)?
            .as_f64()
            .ok_or_else(|| self.invalid(index, "a number"))
    }

    pub fn i64(&self, index: usize) -> InvokeResult<i64> {
        self.value(index)?
            .as_i64()
            .ok_or_else(|| self.invalid(index, "an integer"))
    }

    pub fn str(&self, index: usize) -> InvokeResult<&str> {
        self.value(index)?
            .as_str()
            .ok_or_else(|| self.invalid(index, "a string"))
    }

    pub fn object(&self, index: usize) -> InvokeResult<ObjectRef> {
        self.value(index)?
            .as_object()
            .cloned()
            .ok_or_else(|| self.invalid(index, "an object reference"))
    }

    fn invalid(&self, index: usize, expected: &'static str) -> InvokeError {
        InvokeError::InvalidArgument {
            method: self.method.to_string(),
            index,
            expected,
        }
    }
}
