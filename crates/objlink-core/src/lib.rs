//! objlink Core - Shared types for object-graph RPC
//!
//! This crate provides the pieces shared between the server (objlinkd),
//! the wire protocol and the client:
//! - `ObjectId` and the `RemoteObject` capability trait
//! - `Value`, the live value passed into and out of remote methods
//! - the graph serializer that turns values into wire nodes
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod object;
pub mod serialize;
pub mod value;

// Re-exports for convenience
pub use error::{InvokeError, InvokeResult};
pub use object::{Args, ObjectId, ObjectRef, RemoteObject};
pub use serialize::{
    is_reference, marker_id, reference_marker, serialize, SerializeOptions, Serialized,
    CLASS_KEY, DEFAULT_MAX_DEPTH, META_KEY, METHODS_KEY, THAT_KEY,
};
pub use value::Value;
